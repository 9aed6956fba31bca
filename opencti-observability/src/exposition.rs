use crate::collector::{OpenCtiCollector, Sample, Series};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};

/// Turn scrape samples into gauge families, one per series that has samples.
///
/// Families follow descriptor order; series without samples are left out.
pub fn encode_samples(collector: &OpenCtiCollector, samples: &[Sample]) -> Vec<MetricFamily> {
    let mut families = Vec::new();
    for series in Series::ALL {
        let desc = collector.descriptor(series);
        let mut family = MetricFamily::default();
        family.set_name(desc.fq_name.clone());
        family.set_help(desc.help.clone());
        family.set_field_type(MetricType::GAUGE);

        for sample in samples.iter().filter(|s| s.series == series) {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);

            let mut metric = Metric::default();
            for (name, value) in desc.variable_labels.iter().zip(&sample.label_values) {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            metric.set_gauge(gauge);
            family.mut_metric().push(metric);
        }

        if !family.get_metric().is_empty() {
            families.push(family);
        }
    }
    families
}

/// Merge scrape families with the exporter's own, sorted by name.
pub fn merge_families(
    mut families: Vec<MetricFamily>,
    extra: Vec<MetricFamily>,
) -> Vec<MetricFamily> {
    families.extend(extra);
    families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
    families
}

/// Render prometheus text exposition format.
pub fn render_metrics(families: &[MetricFamily]) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buffer) {
        tracing::error!(error = %e, "Encoding metric families");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
