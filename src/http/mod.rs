//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, outer layers: panic capture, trace, request id, timeout)
//!     → middleware/rate_limit.rs (extract context, span, pace, annotate)
//!     → handlers.rs (business logic, reads RequestContext)
//!     → error.rs (handler failures tagged for the span)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::{HandlerError, HandlerFailure};
pub use server::GatewayServer;
