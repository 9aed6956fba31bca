use prometheus::proto::MetricFamily;
use prometheus::{IntGaugeVec, Opts, Registry};

pub const EXPORTER_NAMESPACE: &str = "opencti_exporter";

/// The exporter's own series: build info and, on Linux, process metrics.
///
/// Registered once at startup and gathered alongside every scrape.
pub struct ExporterMetrics {
    registry: Registry,
}

impl ExporterMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let build_info = IntGaugeVec::new(
            Opts::new(
                "build_info",
                "A metric with a constant '1' value labeled by the version opencti-exporter was built from.",
            )
            .namespace(EXPORTER_NAMESPACE),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        registry.register(Box::new(build_info))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self { registry })
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
