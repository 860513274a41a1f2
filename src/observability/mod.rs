/// Observability module
///
/// Structured logging setup and the Prometheus metrics registry.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, sanitize_query, sanitize_url_for_logging};
pub use metrics::{Metrics, MetricsRegistry, Timer};
