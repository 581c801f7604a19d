//! HTTP Server and Scrape-Driven Collection
//!
//! This module implements the Prometheus exporter HTTP server and wires
//! configured devices to their pollers.
//!
//! # Architecture
//!
//! - **HTTP Server**: Axum-based server exposing `/metrics`, `/health`, and `/` endpoints
//! - **Collection**: Pull-based. Each `/metrics` request refreshes every device
//!   concurrently through its own rate limiter, then renders
//! - **State Management**: Metrics, HTTP client and devices are built once here and shared via Arc
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /health` - Health check (200 if any device is up, 503 otherwise)
//!
//! # Error Handling
//!
//! A failing device only loses its own series; the scrape always completes
//! because every device exchange is bounded by its timeout.

use crate::collectors::{self, CollectionStatus};
use crate::config::{Config, DeviceConfig};
use crate::error::{ExporterError, Result};
use crate::metrics::MetricsCollector;
use crate::shelly::{HttpStatusClient, PollRateLimiter, RequestSource, RpcClient, WsTransport};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// A configured device and its poller
pub struct Device {
    pub config: DeviceConfig,
    pub poller: PollRateLimiter,
}

impl Device {
    /// Build the request source matching the device model.
    pub fn new(config: DeviceConfig, http: &HttpClients) -> Result<Self> {
        let source: Box<dyn RequestSource> = if config.model.uses_rpc() {
            let transport = WsTransport::new(&config.url, config.verify_tls, config.timeout())?;
            info!("{}: RPC endpoint {}", config.name, transport.url());
            Box::new(RpcClient::new(
                config.name.clone(),
                transport,
                config.password.clone(),
                config.timeout(),
            ))
        } else {
            let client = HttpStatusClient::new(
                config.name.clone(),
                http.for_device(&config).clone(),
                &config.url,
                config.username.clone(),
                config.password.clone(),
                config.timeout(),
            )?;
            info!("{}: HTTP endpoint {}", config.name, client.base_url());
            Box::new(client)
        };

        let poller = PollRateLimiter::new(
            config.name.clone(),
            source,
            collectors::method_calls(config.model, config.channel),
            config.min_poll_interval(),
        );

        Ok(Self { config, poller })
    }

    /// Refresh (rate limited) and publish this device's readings.
    pub async fn collect(&self, metrics: &MetricsCollector) -> CollectionStatus {
        let name = self.config.name.as_str();
        let started = Instant::now();

        let result = self.poller.refresh_if_needed().await;

        metrics
            .refresh_duration_seconds
            .with_label_values(&[name])
            .set(started.elapsed().as_secs_f64());
        if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            metrics
                .last_refresh_timestamp_seconds
                .with_label_values(&[name])
                .set(now.as_secs_f64());
        }

        collectors::apply_poll_result(&self.config, &result, metrics)
    }
}

/// Shared HTTP clients for Gen1 devices, one per TLS verification mode
#[derive(Clone)]
pub struct HttpClients {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl HttpClients {
    pub fn new() -> Result<Self> {
        Ok(Self {
            verified: reqwest::Client::builder().build()?,
            unverified: reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }

    fn for_device(&self, config: &DeviceConfig) -> &reqwest::Client {
        if config.verify_tls {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

pub fn build_devices(config: &Config, http: &HttpClients) -> Result<Vec<Device>> {
    config
        .devices
        .iter()
        .cloned()
        .map(|device| Device::new(device, http))
        .collect()
}

#[derive(Clone)]
struct AppState {
    metrics: MetricsCollector,
    devices: Arc<Vec<Device>>,
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = MetricsCollector::new()?;
    let http = HttpClients::new()?;
    let devices = build_devices(&config, &http)?;

    for device in &devices {
        metrics.up.with_label_values(&[&device.config.name]).set(0.0);
    }

    let state = AppState {
        metrics,
        devices: Arc::new(devices),
    };

    // Build the router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ExporterError::Io)?;

    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Refresh every device concurrently; returns how many succeeded.
pub async fn collect_all(devices: &[Device], metrics: &MetricsCollector) -> usize {
    let statuses = join_all(devices.iter().map(|device| device.collect(metrics))).await;
    let up = statuses
        .iter()
        .filter(|status| **status == CollectionStatus::Success)
        .count();
    debug!("Collected {}/{} devices", up, devices.len());
    up
}

async fn root_handler() -> impl IntoResponse {
    r#"<html>
<head><title>Shelly Exporter</title></head>
<body>
<h1>Shelly Prometheus Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    collect_all(&state.devices, &state.metrics).await;

    match state.metrics.render() {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let any_up = state.devices.iter().any(|device| {
        state
            .metrics
            .up
            .with_label_values(&[&device.config.name])
            .get()
            > 0.0
    });

    if any_up {
        (axum::http::StatusCode::OK, "OK")
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "No device reachable",
        )
    }
}
