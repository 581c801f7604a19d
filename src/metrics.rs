//! Prometheus Metrics Definitions
//!
//! This module defines all Prometheus metrics exposed by the Shelly exporter.
//!
//! # Metric Categories
//!
//! ## Exporter Health
//! - `shelly_up{device}` - 1 if the last refresh of the device succeeded
//! - `shelly_last_refresh_timestamp_seconds{device}` - Unix time of the last scrape-triggered refresh
//! - `shelly_refresh_duration_seconds{device}` - Time spent refreshing the device
//!
//! ## Device Readings
//! One gauge per distinct metric name found in the model tables of
//! [`crate::collectors`], labelled by `device` (and `phase` for per-phase
//! three-phase readings).
//!
//! All metrics use the `shelly_` namespace prefix. The registry is owned by
//! the collector instance, never process-global.

use crate::collectors;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const NAMESPACE: &str = "shelly";

/// Metrics collector for Shelly devices
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    // Exporter health
    pub up: Arc<GaugeVec>,
    pub last_refresh_timestamp_seconds: Arc<GaugeVec>,
    pub refresh_duration_seconds: Arc<GaugeVec>,

    // Device readings, keyed by metric name without namespace
    fields: Arc<HashMap<&'static str, GaugeVec>>,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let up = GaugeVec::new(
            Opts::new("up", "Whether the last refresh of the device succeeded (1=up, 0=down)")
                .namespace(NAMESPACE),
            &["device"],
        )?;

        let last_refresh_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "last_refresh_timestamp_seconds",
                "Unix timestamp of the last refresh attempt",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let refresh_duration_seconds = GaugeVec::new(
            Opts::new(
                "refresh_duration_seconds",
                "Time spent refreshing the device during the last scrape",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let mut fields = HashMap::new();
        for spec in collectors::all_fields() {
            if fields.contains_key(spec.metric) {
                continue;
            }
            let gauge = GaugeVec::new(
                Opts::new(spec.metric, spec.help).namespace(NAMESPACE),
                spec.label_names(),
            )?;
            registry.register(Box::new(gauge.clone()))?;
            fields.insert(spec.metric, gauge);
        }

        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(last_refresh_timestamp_seconds.clone()))?;
        registry.register(Box::new(refresh_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            up: Arc::new(up),
            last_refresh_timestamp_seconds: Arc::new(last_refresh_timestamp_seconds),
            refresh_duration_seconds: Arc::new(refresh_duration_seconds),
            fields: Arc::new(fields),
        })
    }

    /// Gauge for a device reading, if the metric name is known
    pub fn field(&self, metric: &str) -> Option<&GaugeVec> {
        self.fields.get(metric)
    }

    pub fn set_field(&self, metric: &str, labels: &[&str], value: f64) {
        match self.fields.get(metric) {
            Some(gauge) => gauge.with_label_values(labels).set(value),
            None => debug!("Unknown metric {}", metric),
        }
    }

    pub fn remove_field(&self, metric: &str, labels: &[&str]) {
        if let Some(gauge) = self.fields.get(metric) {
            // Not present is fine
            let _ = gauge.remove_label_values(labels);
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}
