//! Device Field Mapping
//!
//! Turns cached poll results into gauge values. Each device model is a
//! static table of [`FieldSpec`]s (which method, which JSON path, which
//! metric) instead of per-model code.
//!
//! # Architecture
//!
//! - [`fields`] / [`method_calls`] describe a model
//! - [`apply_poll_result`] writes one device's readings into the
//!   [`MetricsCollector`], honouring the device's `ignore` list
//!
//! # Error Handling
//!
//! Failures are non-fatal. A failed refresh removes the device's series so
//! stale values are not served; a missing field only removes that series.

use crate::config::{DeviceConfig, DeviceModel};
use crate::metrics::MetricsCollector;
use crate::shelly::poller::PollResult;
use crate::shelly::MethodCall;
use serde_json::{json, Value};
use std::borrow::Cow;
use tracing::{debug, warn};

pub mod gen1;
pub mod pro3em;
pub mod switch;

/// Channel placeholder inside a field path
const CHANNEL_SEGMENT: &str = "#";

/// One reading: where to find it and which gauge receives it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub method: &'static str,
    /// Dot-separated path into the method's `result`; numeric segments index arrays
    pub path: &'static str,
    /// Metric name without the `shelly_` namespace
    pub metric: &'static str,
    pub phase: Option<&'static str>,
    pub help: &'static str,
}

impl FieldSpec {
    pub const fn new(
        method: &'static str,
        path: &'static str,
        metric: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            method,
            path,
            metric,
            phase: None,
            help,
        }
    }

    pub const fn phase(
        method: &'static str,
        path: &'static str,
        metric: &'static str,
        phase: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            method,
            path,
            metric,
            phase: Some(phase),
            help,
        }
    }

    /// Label names of the gauge this field writes to
    pub fn label_names(&self) -> &'static [&'static str] {
        if self.phase.is_some() {
            &["device", "phase"]
        } else {
            &["device"]
        }
    }

    pub fn label_values<'a>(&'a self, device: &'a str) -> Vec<&'a str> {
        match self.phase {
            Some(phase) => vec![device, phase],
            None => vec![device],
        }
    }

    fn resolved_path(&self, channel: u32) -> Cow<'static, str> {
        if self.path.contains(CHANNEL_SEGMENT) {
            Cow::Owned(self.path.replace(CHANNEL_SEGMENT, &channel.to_string()))
        } else {
            Cow::Borrowed(self.path)
        }
    }
}

/// Status of applying one device's readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// At least one reading was published
    Success,
    /// Nothing was published (already logged as warning)
    Failed,
}

pub fn fields(model: DeviceModel) -> &'static [FieldSpec] {
    match model {
        DeviceModel::Switch => switch::FIELDS,
        DeviceModel::Pro3em => pro3em::FIELDS,
        DeviceModel::Gen1 => gen1::FIELDS,
    }
}

/// Every field of every model, for metric registration
pub fn all_fields() -> impl Iterator<Item = &'static FieldSpec> {
    [DeviceModel::Switch, DeviceModel::Pro3em, DeviceModel::Gen1]
        .into_iter()
        .flat_map(fields)
}

pub fn metric_names(model: DeviceModel) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = fields(model).iter().map(|f| f.metric).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Calls the poller issues each refresh, in order
pub fn method_calls(model: DeviceModel, channel: u32) -> Vec<MethodCall> {
    match model {
        DeviceModel::Switch => vec![MethodCall::new(switch::METHOD, json!({ "id": channel }))],
        DeviceModel::Pro3em => vec![
            MethodCall::new(pro3em::STATUS_METHOD, json!({ "id": channel })),
            MethodCall::new(pro3em::DATA_METHOD, json!({ "id": channel })),
        ],
        DeviceModel::Gen1 => vec![MethodCall::new(
            crate::shelly::http::STATUS_PATH,
            Value::Null,
        )],
    }
}

/// Numeric value at `path`; booleans read as 1/0.
pub fn lookup(root: &Value, path: &str) -> Option<f64> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }

    match current {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Remove every series this device could have published.
pub fn clear_device(device: &DeviceConfig, metrics: &MetricsCollector) {
    for spec in fields(device.model) {
        metrics.remove_field(spec.metric, &spec.label_values(&device.name));
    }
}

/// Publish one device's latest poll result.
pub fn apply_poll_result(
    device: &DeviceConfig,
    result: &PollResult,
    metrics: &MetricsCollector,
) -> CollectionStatus {
    let name = device.name.as_str();

    if !result.success {
        warn!(
            "{}: refresh failed: {}",
            name,
            result.error.as_deref().unwrap_or("unknown error")
        );
        clear_device(device, metrics);
        metrics.up.with_label_values(&[name]).set(0.0);
        return CollectionStatus::Failed;
    }

    let mut published = 0usize;
    for spec in fields(device.model) {
        let labels = spec.label_values(name);
        if device.is_ignored(spec.metric) {
            continue;
        }

        let value = result
            .result(spec.method)
            .and_then(|root| lookup(root, &spec.resolved_path(device.channel)));

        match value {
            Some(value) => {
                metrics.set_field(spec.metric, &labels, value);
                published += 1;
            }
            None => {
                debug!("{}: no value for {} ({})", name, spec.metric, spec.path);
                metrics.remove_field(spec.metric, &labels);
            }
        }
    }

    if device.model == DeviceModel::Switch && device.derive_current {
        published += apply_derived_current(device, result, metrics);
    }

    if published == 0 {
        warn!("{}: response contained none of the expected fields", name);
        metrics.up.with_label_values(&[name]).set(0.0);
        return CollectionStatus::Failed;
    }

    metrics.up.with_label_values(&[name]).set(1.0);
    CollectionStatus::Success
}

fn apply_derived_current(
    device: &DeviceConfig,
    result: &PollResult,
    metrics: &MetricsCollector,
) -> usize {
    if device.is_ignored(switch::CURRENT_METRIC) {
        return 0;
    }
    let Some(status) = result.result(switch::METHOD) else {
        return 0;
    };
    if status.get("current").is_some() {
        return 0;
    }

    let name = device.name.as_str();
    let derived = lookup(status, switch::POWER_PATH)
        .zip(lookup(status, switch::VOLTAGE_PATH))
        .and_then(|(power, voltage)| switch::derive_current(power, voltage));

    match derived {
        Some(current) => {
            metrics.set_field(switch::CURRENT_METRIC, &[name], current);
            1
        }
        None => {
            debug!("{}: cannot derive current without a usable voltage", name);
            metrics.remove_field(switch::CURRENT_METRIC, &[name]);
            0
        }
    }
}
