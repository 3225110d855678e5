// =============================================================================
// Error taxonomy at the core boundary (spec §7)
// =============================================================================
//
// Recoverable outcomes are recovered locally by the caller and turned into
// health-state transitions; nothing here is ever surfaced past the owning
// loop except via the persisted source-status row. `fatal` is the one kind
// that bubbles all the way to `main` as an `anyhow::Error`.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A malformed source descriptor; the source slot is dropped at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, timeout, or non-2xx status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Body could not be decoded, or decoded to zero records.
    /// Distinct from `Transport`: `last_attempt` advances but the failure
    /// counter does not — an empty feed is not "down".
    #[error("parse error: {0}")]
    Parse(String),

    /// Persistence rejected an insert or query.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Whether this outcome should bump the source's consecutive-failure
    /// counter (transport) or merely advance `last_attempt` (parse).
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Transport(e.to_string())
    }
}
