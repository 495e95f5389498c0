use crate::{FindTrialsRequest, MatchError, SearchResponse};
use async_trait::async_trait;

#[async_trait]
pub trait TrialMatcher {
    async fn find_trials(&self, request: &FindTrialsRequest) -> Result<SearchResponse, MatchError>;
}
