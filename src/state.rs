//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool, the optional LLM client, and the two in-memory
//! tables of the service: per-IP quotas and document sessions. Both tables
//! sit behind store traits so they can be backed by a shared cache later.

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::ApiError;
use crate::llm::types::LlmChat;
use crate::rate_limit::RateLimiter;
use crate::services::conversation::Orchestrator;
use crate::services::document_session::DocumentSessionCache;
use crate::services::secure_folder::SecureFolder;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Optional LLM client. `None` if LLM env vars are not configured.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// Completion ceiling passed on every LLM call.
    pub max_tokens: u32,
    /// Anonymous per-IP quotas.
    pub rate_limiter: RateLimiter,
    /// Live document sessions.
    pub sessions: DocumentSessionCache,
    pub secure_folder: SecureFolder,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, llm: Option<Arc<dyn LlmChat>>, max_tokens: Option<u32>) -> Self {
        Self {
            pool,
            llm,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            rate_limiter: RateLimiter::from_env(),
            sessions: DocumentSessionCache::from_env(),
            secure_folder: SecureFolder::from_env(),
        }
    }

    /// Orchestrator over the configured LLM.
    ///
    /// # Errors
    ///
    /// [`ApiError::LlmUnavailable`] when no LLM is configured.
    pub fn orchestrator(&self) -> Result<Orchestrator, ApiError> {
        let llm = self.llm.clone().ok_or(ApiError::LlmUnavailable)?;
        Ok(Orchestrator::new(llm, self.sessions.clone(), self.max_tokens))
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
