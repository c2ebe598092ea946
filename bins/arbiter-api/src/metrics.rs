// Prometheus metrics for the Arbiter API

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Evaluations started (admitted or not), by mode and language
    pub static ref EVALUATIONS_STARTED: CounterVec = CounterVec::new(
        Opts::new("arbiter_evaluations_started_total", "Total evaluations requested"),
        &["mode", "language"]
    )
    .expect("metric can be created");

    // Verdicts reached, by mode and verdict label
    pub static ref VERDICTS: CounterVec = CounterVec::new(
        Opts::new("arbiter_verdicts_total", "Total evaluations that reached a verdict"),
        &["mode", "verdict"]
    )
    .expect("metric can be created");

    // Admission rejections (backpressure)
    pub static ref REJECTIONS: CounterVec = CounterVec::new(
        Opts::new("arbiter_rejections_total", "Total evaluations rejected at admission"),
        &["reason"]
    )
    .expect("metric can be created");

    // Evaluations that ended in an engine error, by error code
    pub static ref FAILURES: CounterVec = CounterVec::new(
        Opts::new("arbiter_failures_total", "Total evaluations that ended in an engine error"),
        &["mode", "code"]
    )
    .expect("metric can be created");

    pub static ref FIRST_SOLVES: IntCounter = IntCounter::new(
        "arbiter_first_solves_total",
        "Total first accepted solves of a problem by a user"
    )
    .expect("metric can be created");

    pub static ref IN_FLIGHT: IntGauge = IntGauge::new(
        "arbiter_evaluations_in_flight",
        "Evaluations currently running"
    )
    .expect("metric can be created");

    // End-to-end evaluation latency (seconds)
    pub static ref EVALUATION_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "arbiter_evaluation_latency_seconds",
            "Evaluation latency in seconds"
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["mode"]
    )
    .expect("metric can be created");
}

/// Register every collector; safe to call more than once
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVALUATIONS_STARTED.clone()),
        Box::new(VERDICTS.clone()),
        Box::new(REJECTIONS.clone()),
        Box::new(FAILURES.clone()),
        Box::new(FIRST_SOLVES.clone()),
        Box::new(IN_FLIGHT.clone()),
        Box::new(EVALUATION_LATENCY.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => tracing::error!("Failed to register collector: {}", e),
        }
    }
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// `language` must come from a bounded set, never straight from a request body
pub fn record_evaluation_started(mode: &str, language: &str) {
    EVALUATIONS_STARTED.with_label_values(&[mode, language]).inc();
}

pub fn record_evaluation_finished(mode: &str, latency_secs: f64) {
    EVALUATION_LATENCY.with_label_values(&[mode]).observe(latency_secs);
}

/// Raises a gauge for as long as it lives, unwinding included
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl InFlightGuard {
    pub fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

pub fn record_verdict(mode: &str, verdict: &str) {
    VERDICTS.with_label_values(&[mode, verdict]).inc();
}

pub fn record_rejection(reason: &str) {
    REJECTIONS.with_label_values(&[reason]).inc();
}

pub fn record_failure(mode: &str, code: &str) {
    FAILURES.with_label_values(&[mode, code]).inc();
}

pub fn record_first_solve() {
    FIRST_SOLVES.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_metrics_include_recorded_values() {
        init_metrics();
        init_metrics();
        record_rejection("saturated");

        let text = render_metrics();

        assert!(text.contains("arbiter_rejections_total"));
        assert!(text.contains("saturated"));
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let gauge = IntGauge::new("test_in_flight_drop", "test gauge").unwrap();

        {
            let _guard = InFlightGuard::new(gauge.clone());
            assert_eq!(gauge.get(), 1);
        }

        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_guard_releases_when_task_panics() {
        let gauge = IntGauge::new("test_in_flight_panic", "test gauge").unwrap();

        let task_gauge = gauge.clone();
        let joined = tokio::spawn(async move {
            let _guard = InFlightGuard::new(task_gauge);
            panic!("evaluation blew up");
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(gauge.get(), 0);
    }
}
