//! Telemetry collected while the engine runs.

pub mod metrics;

pub use metrics::Metrics;
