//! Immutable controller configuration, built once at startup.
use crate::{labels::DEFAULT_SERVICED_LABEL, retry::RetryConfig, watch::WatchConfig};

/// Configuration shared by both watch loops through the [`crate::utils::Context`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Label key that opts a workload in, its value is ignored
    pub label_key: String,
    /// Reserved service port override, currently only reported at startup
    pub port: Option<i32>,
    /// Reserved target port override, currently only reported at startup
    pub target_port: Option<i32>,
    /// Retry policy for handling a single event
    pub retry: RetryConfig,
    /// Timing of the watch loops
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_SERVICED_LABEL.to_owned(),
            port: None,
            target_port: None,
            retry: RetryConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}
