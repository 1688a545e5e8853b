// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.
//!
//! All thresholds that look like protocol constants — the healthy service
//! level, the minimum sampling interval — are server-profile heuristics and
//! therefore configurable here rather than hard-coded.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientResult, ConfigurationError};
use crate::retry::{FailoverBackoff, RetryPolicy};

// =============================================================================
// RedundancyOverride
// =============================================================================

/// Explicit redundancy-mode override.
///
/// `Auto` defers to the server-advertised redundancy support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyOverride {
    /// Pick based on what the server advertises.
    #[default]
    Auto,
    /// Force the single-server controller.
    SingleServer,
    /// Force the cold-failover controller.
    ColdFailover,
}

// =============================================================================
// CertifierPriority
// =============================================================================

/// One entry of the certifier priority table.
///
/// Lower `priority` values are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifierPriority {
    /// Strategy name, resolved against the compile-time certifier registry.
    pub strategy: String,

    /// Priority rank; lower tries first.
    pub priority: u8,
}

impl CertifierPriority {
    /// Creates a table entry.
    pub fn new(strategy: impl Into<String>, priority: u8) -> Self {
        Self {
            strategy: strategy.into(),
            priority,
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Configuration for the fieldlink client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum attempts per retry-wrapped operation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between bounded-retry attempts.
    #[serde(default = "default_retry_delay")]
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,

    /// Upper bound for a single protocol call.
    #[serde(default = "default_call_timeout")]
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,

    /// Service level at or above which a server counts as healthy (0-255).
    #[serde(default = "default_healthy_service_level")]
    pub healthy_service_level: u8,

    /// Floor applied to requested sampling intervals.
    #[serde(default = "default_min_sampling_interval")]
    #[serde(with = "duration_millis")]
    pub min_sampling_interval: Duration,

    /// Grace period after a session goes inactive before a server switch
    /// is forced. A session that reactivates in time cancels the switch.
    #[serde(default = "default_reconnect_grace")]
    #[serde(with = "duration_millis")]
    pub reconnect_grace: Duration,

    /// First delay of the unbounded failover retry loop.
    #[serde(default = "default_failover_initial_delay")]
    #[serde(with = "duration_millis")]
    pub failover_initial_delay: Duration,

    /// Cap for the failover backoff delay.
    #[serde(default = "default_failover_max_delay")]
    #[serde(with = "duration_millis")]
    pub failover_max_delay: Duration,

    /// Multiplier applied to the failover delay after each failure.
    #[serde(default = "default_failover_multiplier")]
    pub failover_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) applied to failover delays.
    #[serde(default)]
    pub failover_jitter: f64,

    /// Redundancy-mode override.
    #[serde(default)]
    pub redundancy: RedundancyOverride,

    /// Static redundant server URI list. May be empty when the candidate
    /// set comes from the host adapter at connect time.
    #[serde(default)]
    pub server_uris: Vec<String>,

    /// Certifier priority table, lower priority tried first.
    #[serde(default = "default_certifiers")]
    pub certifiers: Vec<CertifierPriority>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_call_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_healthy_service_level() -> u8 {
    200
}

fn default_min_sampling_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_reconnect_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_failover_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_failover_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_failover_multiplier() -> f64 {
    2.0
}

fn default_certifiers() -> Vec<CertifierPriority> {
    vec![
        CertifierPriority::new("certificate", 1),
        CertifierPriority::new("username", 2),
        CertifierPriority::new("anonymous", 3),
    ]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            call_timeout: default_call_timeout(),
            healthy_service_level: default_healthy_service_level(),
            min_sampling_interval: default_min_sampling_interval(),
            reconnect_grace: default_reconnect_grace(),
            failover_initial_delay: default_failover_initial_delay(),
            failover_max_delay: default_failover_max_delay(),
            failover_multiplier: default_failover_multiplier(),
            failover_jitter: 0.0,
            redundancy: RedundancyOverride::Auto,
            server_uris: Vec::new(),
            certifiers: default_certifiers(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Derives the bounded retry policy for per-operation wrapping.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay, self.call_timeout)
    }

    /// Derives the exponential backoff used by the unbounded switch loop.
    pub fn failover_backoff(&self) -> FailoverBackoff {
        FailoverBackoff::new(self.failover_initial_delay, self.failover_max_delay)
            .with_multiplier(self.failover_multiplier)
            .with_jitter(self.failover_jitter)
    }

    /// Clamps a requested sampling interval to the configured floor.
    pub fn clamp_sampling_interval(&self, requested: Duration) -> Duration {
        requested.max(self.min_sampling_interval)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.max_attempts == 0 {
            return Err(
                ConfigurationError::invalid_value("max_attempts", "must be at least 1").into(),
            );
        }
        if self.call_timeout.is_zero() {
            return Err(
                ConfigurationError::invalid_value("call_timeout", "must be non-zero").into(),
            );
        }
        if self.failover_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "failover_multiplier",
                "must be at least 1.0",
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.failover_jitter) {
            return Err(ConfigurationError::invalid_value(
                "failover_jitter",
                "must be within 0.0..=1.0",
            )
            .into());
        }
        if self.failover_max_delay < self.failover_initial_delay {
            return Err(ConfigurationError::invalid_value(
                "failover_max_delay",
                "must be at least failover_initial_delay",
            )
            .into());
        }
        if self.certifiers.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "certifiers",
                "at least one certifier is required",
            )
            .into());
        }
        Ok(())
    }

    /// Returns the certifier table sorted by ascending priority rank.
    pub fn certifiers_by_priority(&self) -> Vec<CertifierPriority> {
        let mut table = self.certifiers.clone();
        table.sort_by_key(|c| c.priority);
        table
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the maximum attempts per operation.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Sets the fixed retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Sets the per-call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Sets the healthy service-level threshold.
    pub fn healthy_service_level(mut self, level: u8) -> Self {
        self.config.healthy_service_level = level;
        self
    }

    /// Sets the sampling-interval floor.
    pub fn min_sampling_interval(mut self, interval: Duration) -> Self {
        self.config.min_sampling_interval = interval;
        self
    }

    /// Sets the inactive-session grace period.
    pub fn reconnect_grace(mut self, grace: Duration) -> Self {
        self.config.reconnect_grace = grace;
        self
    }

    /// Sets the failover backoff initial delay.
    pub fn failover_initial_delay(mut self, delay: Duration) -> Self {
        self.config.failover_initial_delay = delay;
        self
    }

    /// Sets the failover backoff cap.
    pub fn failover_max_delay(mut self, delay: Duration) -> Self {
        self.config.failover_max_delay = delay;
        self
    }

    /// Sets the failover backoff multiplier.
    pub fn failover_multiplier(mut self, multiplier: f64) -> Self {
        self.config.failover_multiplier = multiplier;
        self
    }

    /// Sets the redundancy override.
    pub fn redundancy(mut self, redundancy: RedundancyOverride) -> Self {
        self.config.redundancy = redundancy;
        self
    }

    /// Sets the static server URI list.
    pub fn server_uris(mut self, uris: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.server_uris = uris.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the certifier priority table.
    pub fn certifiers(mut self, certifiers: Vec<CertifierPriority>) -> Self {
        self.config.certifiers = certifiers;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Duration serialization helper
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// Tests
// =============================================================================
