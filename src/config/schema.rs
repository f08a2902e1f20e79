//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every section defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::observability::Sampler;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Admission pacing.
    pub rate_limit: RateLimitConfig,

    /// Request deadlines.
    pub timeouts: TimeoutConfig,

    /// Logging, metrics and span export.
    pub telemetry: TelemetryConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per second across all clients. Must be positive.
    pub requests_per_second: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request deadline in seconds, including time spent paced.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Where finished spans are exported.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    /// Structured `tracing` events.
    #[default]
    Log,
    /// JSON lines on stdout.
    Stdout,
    /// Discard.
    None,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name reported at startup.
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Span exporter.
    pub exporter: ExporterKind,

    /// Flush pending spans at least this often, in milliseconds.
    pub batch_timeout_ms: u64,

    /// Flush as soon as this many spans are pending.
    pub max_batch_size: usize,

    /// Spans queued beyond this are dropped.
    pub max_queue_size: usize,

    /// Sampling policy for new spans.
    pub sampler: Sampler,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "rate-pacer".to_string(),
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            exporter: ExporterKind::Log,
            batch_timeout_ms: 5000,
            max_batch_size: 512,
            max_queue_size: 2048,
            sampler: Sampler::ParentBased,
        }
    }
}
