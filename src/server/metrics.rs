//! Prometheus metrics for the SidecarSet controller

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Controller metrics backed by a private registry
pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconciliation_duration: HistogramVec,
    pods_selected: IntCounterVec,
}

pub type SharedMetrics = Arc<ControllerMetrics>;

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "kulta_sidecarset_reconciliations_total",
                "SidecarSet reconciliations by result",
            ),
            &["result"],
        )?;
        let reconciliation_duration = HistogramVec::new(
            HistogramOpts::new(
                "kulta_sidecarset_reconciliation_duration_seconds",
                "Time spent reconciling one SidecarSet",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )?;
        let pods_selected = IntCounterVec::new(
            Opts::new(
                "kulta_sidecarset_pods_selected_total",
                "Pods selected for an in-place sidecar upgrade",
            ),
            &["sidecarset"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconciliation_duration.clone()))?;
        registry.register(Box::new(pods_selected.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            reconciliation_duration,
            pods_selected,
        })
    }

    pub fn record_reconciliation_success(&self, duration_secs: f64) {
        self.record("success", duration_secs);
    }

    pub fn record_reconciliation_error(&self, duration_secs: f64) {
        self.record("error", duration_secs);
    }

    pub fn record_pods_selected(&self, sidecarset: &str, count: usize) {
        self.pods_selected
            .with_label_values(&[sidecarset])
            .inc_by(count as u64);
    }

    fn record(&self, result: &str, duration_secs: f64) {
        self.reconciliations.with_label_values(&[result]).inc();
        self.reconciliation_duration
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Render all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Create the shared metrics registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encode_after_recording() {
        let metrics = create_metrics().unwrap();
        metrics.record_reconciliation_success(0.2);
        metrics.record_reconciliation_error(0.0);
        metrics.record_pods_selected("log-agent", 3);

        let text = metrics.encode().unwrap();

        assert!(text.contains("kulta_sidecarset_reconciliations_total{result=\"success\"} 1"));
        assert!(text.contains("kulta_sidecarset_reconciliations_total{result=\"error\"} 1"));
        assert!(text.contains("kulta_sidecarset_pods_selected_total{sidecarset=\"log-agent\"} 3"));
        assert!(text.contains("kulta_sidecarset_reconciliation_duration_seconds_bucket"));
    }
}
