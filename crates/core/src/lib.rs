pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod traits;
pub mod validation;

pub use client::{HealthStatus, HttpTrialMatcher};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use controller::{
    SearchController, EMPTY_PATIENT_ID_MESSAGE, EMPTY_SUCCESS_MESSAGE, NO_MATCHES_FOUND_MESSAGE,
};
pub use error::{ConfigError, MatchError, SubmitError, ValidationError};
pub use models::{
    FindTrialsRequest, SearchContext, SearchPhase, SearchResponse, SearchState, Trial,
};
pub use traits::TrialMatcher;
pub use validation::validate_patient_id;
