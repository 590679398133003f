//! Prometheus metrics for the reconciliation engine
//!
//! All metrics live in a private registry prefixed with `photosync`, so
//! several engines (e.g. in tests) never collide on the global registry.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use photosync_core::domain::SyncStatus;

/// Registry holding every engine metric
pub struct EngineMetrics {
    registry: Registry,
    /// Counter: upload attempts by result (synced, failed, skipped, cancelled, halted)
    pub uploads_total: IntCounterVec,
    /// Counter: passes that ran a non-empty batch
    pub passes_total: IntCounter,
    /// Counter: payload bytes handed to the uploader successfully
    pub upload_bytes_total: IntCounter,
    /// Histogram: upload call duration by result
    pub upload_duration_seconds: HistogramVec,
    /// Gauge: records per status, refreshed after every pass
    pub records: IntGaugeVec,
}

impl EngineMetrics {
    /// Creates a registry with all metrics registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("photosync".to_string()), None)?;

        let uploads_total = IntCounterVec::new(
            Opts::new("uploads_total", "Upload attempts by result"),
            &["result"],
        )?;
        registry.register(Box::new(uploads_total.clone()))?;

        let passes_total = IntCounter::new("passes_total", "Reconciliation passes run")?;
        registry.register(Box::new(passes_total.clone()))?;

        let upload_bytes_total =
            IntCounter::new("upload_bytes_total", "Payload bytes uploaded")?;
        registry.register(Box::new(upload_bytes_total.clone()))?;

        let upload_duration_seconds = HistogramVec::new(
            HistogramOpts::new("upload_duration_seconds", "Upload call duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
            &["result"],
        )?;
        registry.register(Box::new(upload_duration_seconds.clone()))?;

        let records = IntGaugeVec::new(
            Opts::new("records", "Records per sync status"),
            &["status"],
        )?;
        registry.register(Box::new(records.clone()))?;

        Ok(Self {
            registry,
            uploads_total,
            passes_total,
            upload_bytes_total,
            upload_duration_seconds,
            records,
        })
    }

    pub fn record_upload(&self, result: &str) {
        self.uploads_total.with_label_values(&[result]).inc();
    }

    pub fn record_pass(&self) {
        self.passes_total.inc();
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.upload_bytes_total.inc_by(bytes);
    }

    pub fn observe_upload_duration(&self, result: &str, duration_secs: f64) {
        self.upload_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    pub fn set_records(&self, status: SyncStatus, count: u64) {
        self.records
            .with_label_values(&[status.as_str()])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}
