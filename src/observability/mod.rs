//! Observability for the feed client
//!
//! Structured logging through `tracing`; the client itself only emits events and spans.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{dispatch_span, mqtt_span};
