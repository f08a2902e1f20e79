//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flags override individual fields (main.rs)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    ExporterKind, GatewayConfig, ListenerConfig, RateLimitConfig, TelemetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
