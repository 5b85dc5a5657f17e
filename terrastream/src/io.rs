//! Per-request I/O options handed to layers.

use tokio_util::sync::CancellationToken;

/// Default number of attempts a layer may make for one fetch.
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 1;

/// Options passed down to data sources for a single tile request.
#[derive(Debug, Clone)]
pub struct IoOptions {
    cancel: CancellationToken,
    /// Upper bound on attempts a layer may make before giving up.
    pub max_attempts: u32,
    /// Free-form tag identifying the requester, used in logs.
    pub referrer: Option<String>,
}

impl Default for IoOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            max_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
            referrer: None,
        }
    }
}

impl IoOptions {
    /// Same options observing `token` instead.
    pub fn with_cancel(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
