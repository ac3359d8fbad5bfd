use std::sync::Arc;

use assess_core::model::{SessionId, SessionMode, SessionResult};
use gateway::{InMemoryResultCache, ResultCache, SessionGateway};

use crate::error::SessionError;

/// Read facade for submitted results, served through the result cache.
///
/// Entries are stored under the mode's cache tags, so a later submission in
/// the same mode invalidates them and the next read goes back to the server.
#[derive(Clone)]
pub struct ResultsService {
    gateway: Arc<dyn SessionGateway>,
    cache: Arc<dyn ResultCache>,
}

impl ResultsService {
    #[must_use]
    pub fn new(gateway: Arc<dyn SessionGateway>, cache: Arc<dyn ResultCache>) -> Self {
        Self { gateway, cache }
    }

    #[must_use]
    pub fn with_local_cache(gateway: Arc<dyn SessionGateway>) -> Self {
        Self::new(gateway, Arc::new(InMemoryResultCache::new()))
    }

    /// Load the result of a submitted session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Gateway` when the server call fails.
    pub async fn result(
        &self,
        session_id: &SessionId,
        mode: SessionMode,
    ) -> Result<SessionResult, SessionError> {
        if let Some(hit) = self.cache.lookup(session_id.as_str()) {
            tracing::debug!(%session_id, "result served from cache");
            return Ok(hit);
        }
        let result = self.gateway.fetch_results(session_id).await?;
        self.cache
            .store(session_id.as_str(), &mode.cache_tags(), result.clone());
        Ok(result)
    }
}
