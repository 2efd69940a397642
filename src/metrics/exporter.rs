use crate::metrics::collector::MetricsCollector;
use crate::{KgadgetError, Result};
use prometheus::{Encoder, TextEncoder};

/// Formats collected metrics in the Prometheus text exposition format
pub struct PrometheusExporter<'a> {
    collector: &'a MetricsCollector,
}

impl<'a> PrometheusExporter<'a> {
    pub fn new(collector: &'a MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn format_metrics(&self) -> Result<String> {
        let families = self.collector.registry().gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            KgadgetError::MetricsError(prometheus::Error::Msg(format!(
                "metrics are not valid UTF-8: {}",
                e
            )))
        })
    }
}
