//! Lifecycle of a single trial search.
//!
//! `SearchController` owns the [`SearchState`] and is the only thing that
//! mutates it. Hosts read snapshots with [`SearchController::state`] or watch
//! transitions through [`SearchController::subscribe`].
//!
//! ```text
//! Idle ─submit─▶ Validating ─ok─▶ InFlight ─▶ Succeeded | EmptyResult | Failed
//!                    └──empty id──────────────────────────────────────▶ Failed
//! ```
//!
//! Terminal phases are terminal per submission only; the next `submit`
//! starts over from Validating. While a request is in flight further
//! submissions are rejected with [`SubmitError::Busy`].

use crate::error::{MatchError, SubmitError};
use crate::models::{FindTrialsRequest, SearchPhase, SearchResponse, SearchState, Trial};
use crate::traits::TrialMatcher;
use crate::validation::validate_patient_id;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const EMPTY_PATIENT_ID_MESSAGE: &str = "Please enter a Patient ID.";
pub const NO_MATCHES_FOUND_MESSAGE: &str = "No suitable recruiting trials found.";
pub const EMPTY_SUCCESS_MESSAGE: &str = "Search successful, but no trials matched the criteria.";

pub struct SearchController<M>
where
    M: TrialMatcher,
{
    matcher: M,
    state: watch::Sender<SearchState>,
    shutdown: CancellationToken,
}

impl<M> SearchController<M>
where
    M: TrialMatcher + Send + Sync,
{
    pub fn new(matcher: M) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            matcher,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SearchPhase {
        self.state.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Abandons any in-flight request and refuses later submissions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs one submission to its terminal phase.
    ///
    /// Dropping the returned future before it resolves puts the state back
    /// to Idle, so an abandoned request never leaves the controller stuck in
    /// InFlight.
    pub async fn submit(&self, raw_input: &str) -> Result<SearchPhase, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Cancelled);
        }

        let submission = Uuid::new_v4();
        if !self.begin(submission, raw_input) {
            warn!(%submission, "search rejected: another search is in flight");
            return Err(SubmitError::Busy);
        }
        let mut guard = SubmissionGuard::new(&self.state, submission);

        let patient_id = match validate_patient_id(raw_input) {
            Ok(patient_id) => patient_id,
            Err(error) => {
                info!(%submission, %error, "search rejected before sending");
                let phase = self.finish(Outcome::Failed(EMPTY_PATIENT_ID_MESSAGE.to_string()));
                guard.disarm();
                return Ok(phase);
            }
        };

        self.state.send_modify(|state| {
            state.patient_id = patient_id.clone();
            state.clear_results();
            state.phase = SearchPhase::InFlight;
        });
        info!(%submission, %patient_id, "searching for trials");

        let request = FindTrialsRequest::new(patient_id, None);
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                info!(%submission, "search abandoned on shutdown");
                return Err(SubmitError::Cancelled);
            }
            result = self.matcher.find_trials(&request) => result,
        };

        let phase = self.finish(Outcome::classify(result));
        guard.disarm();
        Ok(phase)
    }

    fn begin(&self, submission: Uuid, raw_input: &str) -> bool {
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if state.phase.is_busy() {
                return false;
            }
            state.patient_id = raw_input.to_string();
            state.clear_results();
            state.phase = SearchPhase::Validating;
            state.submission = Some(submission);
            accepted = true;
            true
        });
        accepted
    }

    fn finish(&self, outcome: Outcome) -> SearchPhase {
        let mut phase = SearchPhase::Idle;
        self.state.send_modify(|state| {
            phase = outcome.apply(state);
            match phase {
                SearchPhase::Failed => warn!(
                    submission = ?state.submission,
                    error = state.error_message.as_deref().unwrap_or_default(),
                    "search failed"
                ),
                _ => info!(
                    submission = ?state.submission,
                    %phase,
                    matches = state.matches.as_ref().map_or(0, Vec::len),
                    "search finished"
                ),
            }
        });
        phase
    }
}

/// Resets the state to Idle if a submission ends without reaching a terminal phase.
struct SubmissionGuard<'a> {
    state: &'a watch::Sender<SearchState>,
    submission: Uuid,
    armed: bool,
}

impl<'a> SubmissionGuard<'a> {
    fn new(state: &'a watch::Sender<SearchState>, submission: Uuid) -> Self {
        Self {
            state,
            submission,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let submission = self.submission;
        self.state.send_if_modified(|state| {
            if state.submission != Some(submission) || !state.phase.is_busy() {
                return false;
            }
            debug!(%submission, "search abandoned, returning to idle");
            state.clear_results();
            state.phase = SearchPhase::Idle;
            true
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Matches {
        trials: Vec<Trial>,
        searched_at: Option<DateTime<Utc>>,
    },
    Empty {
        message: String,
        searched_at: Option<DateTime<Utc>>,
    },
    Failed(String),
}

impl Outcome {
    fn classify(result: Result<SearchResponse, MatchError>) -> Self {
        match result {
            Ok(SearchResponse::Success {
                matches,
                searched_at,
            }) if matches.is_empty() => Self::Empty {
                message: EMPTY_SUCCESS_MESSAGE.to_string(),
                searched_at,
            },
            Ok(SearchResponse::Success {
                matches,
                searched_at,
            }) => Self::Matches {
                trials: matches,
                searched_at,
            },
            Ok(SearchResponse::NoMatchesFound {
                message,
                searched_at,
            }) => Self::Empty {
                message: message
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| NO_MATCHES_FOUND_MESSAGE.to_string()),
                searched_at,
            },
            Err(error) => Self::Failed(error.to_string()),
        }
    }

    fn apply(self, state: &mut SearchState) -> SearchPhase {
        state.clear_results();
        state.phase = match self {
            Self::Matches {
                trials,
                searched_at,
            } => {
                state.matches = Some(trials);
                state.searched_at = searched_at;
                SearchPhase::Succeeded
            }
            Self::Empty {
                message,
                searched_at,
            } => {
                state.matches = Some(Vec::new());
                state.info_message = Some(message);
                state.searched_at = searched_at;
                SearchPhase::EmptyResult
            }
            Self::Failed(message) => {
                state.error_message = Some(message);
                SearchPhase::Failed
            }
        };
        state.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    fn trial(id: &str) -> Trial {
        Trial {
            trial_id: id.to_string(),
            title: format!("Trial {id}"),
            status: "Recruiting".to_string(),
            phase: "3".to_string(),
            condition: "Breast Cancer".to_string(),
            locations: Some(vec!["City Hospital".to_string()]),
            contact_info: None,
            details_url: None,
            match_rationale: Some(vec!["HER2+ biomarker present".to_string()]),
            flags: None,
        }
    }

    /// Replays scripted results and records every request it sees.
    #[derive(Default)]
    struct ScriptedMatcher {
        responses: Mutex<VecDeque<Result<SearchResponse, MatchError>>>,
        requests: Mutex<Vec<FindTrialsRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedMatcher {
        fn replying(responses: Vec<Result<SearchResponse, MatchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn gated(self, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..self
            }
        }

        fn patient_ids(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| request.patient_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TrialMatcher for ScriptedMatcher {
        async fn find_trials(
            &self,
            request: &FindTrialsRequest,
        ) -> Result<SearchResponse, MatchError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    fn success(trials: Vec<Trial>) -> Result<SearchResponse, MatchError> {
        Ok(SearchResponse::Success {
            matches: trials,
            searched_at: None,
        })
    }

    fn assert_terminal_invariant(state: &SearchState) {
        match state.phase {
            SearchPhase::Succeeded | SearchPhase::EmptyResult => {
                assert!(state.matches.is_some());
                assert!(state.error_message.is_none());
            }
            SearchPhase::Failed => {
                assert!(state.matches.is_none());
                assert!(state.error_message.is_some());
                assert!(state.info_message.is_none());
            }
            _ => {
                assert!(state.matches.is_none());
                assert!(state.error_message.is_none());
            }
        }
    }

    #[tokio::test]
    async fn blank_input_fails_without_network_calls() {
        let controller = SearchController::new(ScriptedMatcher::default());

        for raw in ["", "   ", "\t\n"] {
            let phase = controller.submit(raw).await.unwrap();
            assert_eq!(phase, SearchPhase::Failed);

            let state = controller.state();
            assert_eq!(state.error_message.as_deref(), Some(EMPTY_PATIENT_ID_MESSAGE));
            assert_terminal_invariant(&state);
        }

        assert!(controller.matcher().patient_ids().is_empty());
    }

    #[tokio::test]
    async fn sends_one_request_with_trimmed_identifier() {
        let matcher = ScriptedMatcher::replying(vec![success(vec![trial("NCT001")])]);
        let controller = SearchController::new(matcher);

        controller.submit("  PATIENT 001 \n").await.unwrap();

        assert_eq!(controller.matcher().patient_ids(), ["PATIENT 001"]);
        assert_eq!(controller.state().patient_id, "PATIENT 001");
    }

    #[tokio::test]
    async fn matches_are_kept_in_server_order() {
        let matcher = ScriptedMatcher::replying(vec![success(vec![trial("NCT003"), trial("NCT001")])]);
        let controller = SearchController::new(matcher);

        let phase = controller.submit("PATIENT_002").await.unwrap();

        let state = controller.state();
        assert_eq!(phase, SearchPhase::Succeeded);
        assert_eq!(state.matches, Some(vec![trial("NCT003"), trial("NCT001")]));
        assert_eq!(state.info_message, None);
        assert_terminal_invariant(&state);
    }

    #[tokio::test]
    async fn empty_success_reports_default_message() {
        let controller = SearchController::new(ScriptedMatcher::replying(vec![success(Vec::new())]));

        let phase = controller.submit("PATIENT_003").await.unwrap();

        let state = controller.state();
        assert_eq!(phase, SearchPhase::EmptyResult);
        assert_eq!(state.matches, Some(Vec::new()));
        assert_eq!(state.info_message.as_deref(), Some(EMPTY_SUCCESS_MESSAGE));
        assert_terminal_invariant(&state);
    }

    #[tokio::test]
    async fn no_matches_found_uses_server_message_or_default() {
        let matcher = ScriptedMatcher::replying(vec![
            Ok(SearchResponse::NoMatchesFound {
                message: Some("Custom text".to_string()),
                searched_at: None,
            }),
            Ok(SearchResponse::NoMatchesFound {
                message: None,
                searched_at: None,
            }),
        ]);
        let controller = SearchController::new(matcher);

        controller.submit("PATIENT_NO_MATCH").await.unwrap();
        assert_eq!(controller.state().info_message.as_deref(), Some("Custom text"));

        let phase = controller.submit("PATIENT_NO_MATCH").await.unwrap();
        let state = controller.state();
        assert_eq!(phase, SearchPhase::EmptyResult);
        assert_eq!(state.info_message.as_deref(), Some(NO_MATCHES_FOUND_MESSAGE));
        assert_ne!(state, SearchState::default());
    }

    #[tokio::test]
    async fn request_failures_surface_their_message() {
        let matcher = ScriptedMatcher::replying(vec![
            Err(MatchError::Server {
                status: 500,
                detail: Some("db down".to_string()),
            }),
            Err(MatchError::Server {
                status: 500,
                detail: None,
            }),
            Err(MatchError::Transport("connection refused".to_string())),
            Err(MatchError::UnexpectedStatus {
                status: Some("queued".to_string()),
                message: None,
            }),
        ]);
        let controller = SearchController::new(matcher);

        let expected = [
            "db down",
            "Request failed! Status: 500",
            "connection refused",
            crate::error::UNEXPECTED_STATUS_MESSAGE,
        ];
        for message in expected {
            let phase = controller.submit("PATIENT_ERROR").await.unwrap();
            let state = controller.state();
            assert_eq!(phase, SearchPhase::Failed);
            assert_eq!(state.error_message.as_deref(), Some(message));
            assert_terminal_invariant(&state);
        }
    }

    #[tokio::test]
    async fn resubmission_clears_previous_outcome_before_sending() {
        let gate = Arc::new(Notify::new());
        let matcher = ScriptedMatcher::replying(vec![
            Err(MatchError::Transport("timed out".to_string())),
            success(vec![trial("NCT001")]),
        ])
        .gated(gate.clone());
        let controller = Arc::new(SearchController::new(matcher));

        gate.notify_one();
        controller.submit("PATIENT_001").await.unwrap();
        assert_eq!(controller.phase(), SearchPhase::Failed);

        let mut states = controller.subscribe();
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("PATIENT_001").await }
        });

        let in_flight = states
            .wait_for(|state| state.is_in_flight())
            .await
            .unwrap()
            .clone();
        assert_eq!(in_flight.error_message, None);
        assert_eq!(in_flight.matches, None);
        assert_eq!(in_flight.info_message, None);

        gate.notify_one();
        assert_eq!(task.await.unwrap(), Ok(SearchPhase::Succeeded));
    }

    #[tokio::test]
    async fn identical_submissions_yield_identical_outcomes() {
        let matcher = ScriptedMatcher::replying(vec![
            success(vec![trial("NCT001"), trial("NCT002")]),
            success(vec![trial("NCT001"), trial("NCT002")]),
        ]);
        let controller = SearchController::new(matcher);

        controller.submit("PATIENT_001").await.unwrap();
        let first = controller.state();
        controller.submit("PATIENT_001").await.unwrap();
        let second = controller.state();

        assert_ne!(first.submission, second.submission);
        assert_eq!(
            SearchState {
                submission: None,
                ..first
            },
            SearchState {
                submission: None,
                ..second
            }
        );
    }

    #[tokio::test]
    async fn submission_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let matcher = ScriptedMatcher::replying(vec![success(vec![trial("NCT001")])]).gated(gate.clone());
        let controller = Arc::new(SearchController::new(matcher));
        let mut states = controller.subscribe();

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("PATIENT_001").await }
        });
        states.wait_for(|state| state.is_in_flight()).await.unwrap();
        let before = controller.state();

        assert_eq!(controller.submit("PATIENT_002").await, Err(SubmitError::Busy));
        assert_eq!(controller.state(), before);

        gate.notify_one();
        assert_eq!(task.await.unwrap(), Ok(SearchPhase::Succeeded));
        assert_eq!(controller.matcher().patient_ids(), ["PATIENT_001"]);
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_request() {
        let gate = Arc::new(Notify::new());
        let matcher = ScriptedMatcher::default().gated(gate);
        let controller = Arc::new(SearchController::new(matcher));
        let mut states = controller.subscribe();

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("PATIENT_001").await }
        });
        states.wait_for(|state| state.is_in_flight()).await.unwrap();

        controller.shutdown();
        assert_eq!(task.await.unwrap(), Err(SubmitError::Cancelled));

        let state = controller.state();
        assert_eq!(state.phase, SearchPhase::Idle);
        assert_terminal_invariant(&state);
        assert_eq!(controller.submit("PATIENT_001").await, Err(SubmitError::Cancelled));
    }

    #[tokio::test]
    async fn dropped_submission_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let controller = SearchController::new(ScriptedMatcher::default().gated(gate));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            controller.submit("PATIENT_001"),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(controller.phase(), SearchPhase::Idle);
    }

    #[test]
    fn classification_is_total() {
        assert_eq!(
            Outcome::classify(success(Vec::new())),
            Outcome::Empty {
                message: EMPTY_SUCCESS_MESSAGE.to_string(),
                searched_at: None
            }
        );
        assert_eq!(
            Outcome::classify(Ok(SearchResponse::NoMatchesFound {
                message: Some(String::new()),
                searched_at: None
            })),
            Outcome::Empty {
                message: NO_MATCHES_FOUND_MESSAGE.to_string(),
                searched_at: None
            }
        );
        assert_eq!(
            Outcome::classify(Err(MatchError::Protocol("invalid response body".to_string()))),
            Outcome::Failed("invalid response body".to_string())
        );
    }
}
