pub mod builder;
pub mod handler;
pub mod metrics;

pub use builder::{BoundServer, ServerBuilder};
pub use handler::{render, HealthHandler, TransportError};
pub use metrics::MetricsHandler;
