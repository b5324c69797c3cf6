//! Bridge runtime: connection lifecycle, forwarding and supervision

pub mod connection;
pub mod pipeline;
pub mod state;
pub mod supervisor;

pub use connection::{BrokerConnection, MessageHandler};
pub use pipeline::{ForwardOutcome, ForwardingPipeline, Payload};
pub use state::{ConnectionState, ConnectionStatus, LifecycleEvent};
pub use supervisor::Supervisor;
