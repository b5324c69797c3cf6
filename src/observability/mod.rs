//! Observability: structured logging, bridge events and counters

pub mod events;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use events::{BridgeEvent, CompositeSink, EventSink, SharedSink, TracingSink};
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{BridgeMetrics, MetricsSnapshot, RoleSnapshot};

// Span macros for structured logging
pub use logging::{bridge_span, connection_span};
