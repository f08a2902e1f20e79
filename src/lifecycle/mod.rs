//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics exporter → span pipeline → server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain in-flight → flush spans → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Span pipeline outlives the server so in-flight spans are flushed

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
