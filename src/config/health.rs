// ABOUTME: Health gate configuration.
// ABOUTME: Settle delay, polling bounds, and the endpoint checks that must all pass.

use crate::health::EndpointCheck;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Applied once after the stack starts, before the first probe.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub settle: Duration,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum probes per check.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Overall bound on the polling phase (excluding the settle delay).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Per-request bound handed to curl.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(deserialize_with = "super::deserialize::deserialize_checks")]
    pub checks: NonEmpty<EndpointCheck>,
}

fn default_settle() -> Duration {
    Duration::from_secs(10)
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_attempts() -> u32 {
    12
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

impl HealthConfig {
    pub fn new(checks: NonEmpty<EndpointCheck>) -> Self {
        Self {
            settle: default_settle(),
            interval: default_interval(),
            attempts: default_attempts(),
            timeout: default_timeout(),
            request_timeout: default_request_timeout(),
            checks,
        }
    }
}
