//! Configuration for the sync client.

use crate::error::{ClientError, ClientResult};

/// Configuration for a [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Log request lifecycle events at info level instead of debug.
    pub verbose: bool,
    /// Emit function log lines through `tracing` as responses arrive.
    pub forward_log_lines: bool,
    /// Label prefixed to forwarded function log lines.
    pub log_prefix: String,
}

impl ClientConfig {
    /// Creates a new client configuration with default settings.
    pub fn new() -> Self {
        Self {
            verbose: false,
            forward_log_lines: true,
            log_prefix: "udf".into(),
        }
    }

    /// Sets verbose lifecycle logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets whether function log lines are forwarded.
    pub fn with_forward_log_lines(mut self, forward: bool) -> Self {
        self.forward_log_lines = forward;
        self
    }

    /// Sets the label prefixed to forwarded log lines.
    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    /// Checks the configuration for invalid values.
    pub fn validate(&self) -> ClientResult<()> {
        if self.forward_log_lines && self.log_prefix.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "log prefix must not be empty when forwarding log lines".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
