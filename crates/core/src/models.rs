use crate::error::MatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};
use uuid::Uuid;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_NO_MATCHES_FOUND: &str = "no_matches_found";

/// A clinical study returned by the matching service.
///
/// Optional collections keep the distinction between a field the server left
/// out (`None`) and one it sent empty (`Some(vec![])`).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub trial_id: String,
    pub title: String,
    pub status: String,
    pub phase: String,
    pub condition: String,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    pub details_url: Option<String>,
    #[serde(default)]
    pub match_rationale: Option<Vec<String>>,
    #[serde(default)]
    pub flags: Option<Vec<String>>,
}

impl Trial {
    pub fn is_recruiting(&self) -> bool {
        self.status.eq_ignore_ascii_case("recruiting")
    }

    pub fn locations(&self) -> &[String] {
        self.locations.as_deref().unwrap_or_default()
    }

    pub fn match_rationale(&self) -> &[String] {
        self.match_rationale.as_deref().unwrap_or_default()
    }

    pub fn flags(&self) -> &[String] {
        self.flags.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requesting_clinician_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_radius_km: Option<u32>,
}

impl SearchContext {
    pub fn is_empty(&self) -> bool {
        self.requesting_clinician_id.is_none() && self.search_radius_km.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FindTrialsRequest {
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<SearchContext>,
}

impl FindTrialsRequest {
    pub fn new(patient_id: impl Into<String>, context: Option<SearchContext>) -> Self {
        Self {
            patient_id: patient_id.into(),
            context: context.filter(|context| !context.is_empty()),
        }
    }
}

/// Decoded body of a 2xx response from `/api/v1/trials/find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResponse {
    Success {
        matches: Vec<Trial>,
        searched_at: Option<DateTime<Utc>>,
    },
    NoMatchesFound {
        message: Option<String>,
        searched_at: Option<DateTime<Utc>>,
    },
}

impl SearchResponse {
    /// Reads `status` before anything else, so an unknown status still
    /// surfaces the server's `message` whatever shape the other fields have.
    pub fn from_json(body: &str) -> Result<Self, MatchError> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|error| MatchError::Protocol(format!("invalid response body: {error}")))?;

        let message = parsed
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string);
        let searched_at = parsed
            .get("searchTimestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        match parsed.get("status").and_then(Value::as_str) {
            Some(STATUS_SUCCESS) => {
                let matches = parsed.get("matches").cloned().ok_or_else(|| {
                    MatchError::Protocol("success response is missing `matches`".to_string())
                })?;
                let matches: Vec<Trial> = serde_json::from_value(matches).map_err(|error| {
                    MatchError::Protocol(format!("invalid `matches` in response: {error}"))
                })?;
                Ok(Self::Success {
                    matches,
                    searched_at,
                })
            }
            Some(STATUS_NO_MATCHES_FOUND) => Ok(Self::NoMatchesFound {
                message,
                searched_at,
            }),
            status => Err(MatchError::UnexpectedStatus {
                status: status.map(str::to_string),
                message,
            }),
        }
    }
}

// Timestamps without an offset are read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    #[default]
    Idle,
    Validating,
    InFlight,
    Succeeded,
    EmptyResult,
    Failed,
}

impl SearchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::EmptyResult | Self::Failed)
    }

    pub fn is_busy(self) -> bool {
        matches!(self, Self::Validating | Self::InFlight)
    }
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::EmptyResult => "empty_result",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything a host needs to render the current search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchState {
    pub patient_id: String,
    pub phase: SearchPhase,
    pub matches: Option<Vec<Trial>>,
    pub error_message: Option<String>,
    pub info_message: Option<String>,
    pub searched_at: Option<DateTime<Utc>>,
    pub submission: Option<Uuid>,
}

impl SearchState {
    pub(crate) fn clear_results(&mut self) {
        self.matches = None;
        self.error_message = None;
        self.info_message = None;
        self.searched_at = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == SearchPhase::InFlight
    }
}
