pub mod collector;
pub mod exposition;
pub mod metrics;

pub use collector::{OpenCtiCollector, ProbeResult, Sample, Series};
pub use metrics::ExporterMetrics;
