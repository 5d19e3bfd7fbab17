//! Client configuration.
//!
//! Defaults match the reference client: port 1234, four workers and a
//! 256 byte read budget. A config file is plain JSON with any subset of
//! the fields:
//!
//! ```json
//! { "host": "pixelflut.example.org", "workers": 8, "failure_policy": "finish_remaining" }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PixelflutError, Result};
use crate::protocol::DEFAULT_MAX_LINE_LEN;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Default Pixelflut port.
pub const DEFAULT_PORT: u16 = 1234;

/// Default number of draw workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a response line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What a draw does with the other workers once one of them fails.
///
/// The first error is returned either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort all other workers immediately.
    #[default]
    AbortRemaining,
    /// Let the other workers finish their strips.
    FinishRemaining,
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Number of concurrent draw workers (one strip each).
    pub workers: usize,
    /// Byte budget for one response line; also the socket read size.
    pub read_buffer_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Capacity of the outbound command queue, in messages.
    pub channel_capacity: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            read_buffer_size: DEFAULT_MAX_LINE_LEN,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            failure_policy: FailurePolicy::AbortRemaining,
        }
    }
}

impl ClientConfig {
    /// Config for `host:port` with everything else defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse JSON config text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of draw workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the response line budget.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the outbound queue capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// `host:port` for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PixelflutError::InvalidArgument(
                "workers must be at least 1".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(PixelflutError::InvalidArgument(
                "read_buffer_size must be at least 1".into(),
            ));
        }
        if self.read_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(PixelflutError::InvalidArgument(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Options the connection layer needs.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            read_buffer_size: self.read_buffer_size,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Settings for a single [`Connection`](crate::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// Default wait for a response line.
    pub read_timeout: Duration,
    /// Byte budget for one response line.
    pub read_buffer_size: usize,
    pub channel_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ClientConfig::default().connection_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 1234);
        assert_eq!(config.workers, 4);
        assert_eq!(config.read_buffer_size, 256);
        assert_eq!(config.failure_policy, FailurePolicy::AbortRemaining);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{ "host": "canvas.local", "workers": 8, "failure_policy": "finish_remaining" }"#,
        )
        .unwrap();
        assert_eq!(config.host, "canvas.local");
        assert_eq!(config.workers, 8);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.failure_policy, FailurePolicy::FinishRemaining);
        assert_eq!(config.address(), "canvas.local:1234");
    }

    #[test]
    fn test_invalid_json() {
        let err = ClientConfig::from_json_str("{ workers: }").unwrap_err();
        assert!(matches!(err, PixelflutError::Json(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = ClientConfig::from_json_str(r#"{ "workers": 0 }"#).unwrap_err();
        assert!(matches!(err, PixelflutError::InvalidArgument(_)));
    }

    #[test]
    fn test_builder_configuration() {
        let config = ClientConfig::new("example.org", 4242)
            .workers(16)
            .read_buffer_size(512)
            .connect_timeout(Duration::from_secs(1))
            .read_timeout(Duration::from_millis(250))
            .channel_capacity(32)
            .failure_policy(FailurePolicy::FinishRemaining);

        let options = config.connection_options();
        assert_eq!(config.workers, 16);
        assert_eq!(options.read_buffer_size, 512);
        assert_eq!(options.connect_timeout, Duration::from_secs(1));
        assert_eq!(options.read_timeout, Duration::from_millis(250));
        assert_eq!(options.channel_capacity, 32);
    }
}
