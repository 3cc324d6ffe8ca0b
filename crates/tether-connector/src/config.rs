//! Connector configuration.

use std::time::Duration;

/// Default bound on a dial, admission included.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for the admission frame to be written.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of requests that may be queued on a session.
pub const DEFAULT_SESSION_QUEUE: usize = 64;

/// Tunables of a [`Connector`](crate::Connector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Maximum time for a dial, from the first byte to the remote's admission.
    pub dial_timeout: Duration,
    /// Maximum time a request waits for its response.
    pub request_timeout: Duration,
    /// How long `disconnect` lets sessions close on their own before
    /// revoking them.
    pub drain_timeout: Duration,
    /// Maximum time to tell an inbound peer whether it is admitted.
    pub admission_timeout: Duration,
    /// Requests that may wait for the session task before callers block.
    pub session_queue: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drain_timeout: Duration::ZERO,
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            session_queue: DEFAULT_SESSION_QUEUE,
        }
    }
}

impl ConnectorConfig {
    /// Sets the dial timeout.
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dial_timeout.is_zero() {
            return Err("dial_timeout must be positive".into());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be positive".into());
        }
        if self.admission_timeout.is_zero() {
            return Err("admission_timeout must be positive".into());
        }
        if self.session_queue == 0 {
            return Err("session_queue must be at least 1".into());
        }
        Ok(())
    }
}
