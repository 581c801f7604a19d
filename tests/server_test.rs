//! Server integration tests
//!
//! Tests for device wiring and scrape-driven collection.

use secrecy::SecretString;
use shelly_exporter::config::{Config, DeviceConfig, DeviceModel, ServerConfig};
use shelly_exporter::metrics::MetricsCollector;
use shelly_exporter::server::{build_devices, collect_all, HttpClients};
use tokio::net::TcpListener;

fn device(name: &str, url: &str, model: DeviceModel) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        url: url.to_string(),
        model,
        channel: 0,
        username: "admin".to_string(),
        password: Some(SecretString::from("pw")),
        timeout_seconds: 1,
        min_poll_interval_ms: 800,
        ignore: vec![],
        derive_current: false,
        verify_tls: true,
    }
}

async fn closed_port() -> String {
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    addr.to_string()
}

#[test]
fn test_build_devices_for_every_model() {
    // Given: One device per model
    let config = Config {
        server: ServerConfig::default(),
        devices: vec![
            device("plug", "http://10.0.0.2", DeviceModel::Switch),
            device("meter", "ws://10.0.0.3/rpc", DeviceModel::Pro3em),
            device("old-plug", "10.0.0.4", DeviceModel::Gen1),
        ],
    };
    let http = HttpClients::new().unwrap();

    // When: Building the device set
    let devices = build_devices(&config, &http).expect("devices");

    // Then: Each gets a poller named after it
    let names: Vec<_> = devices.iter().map(|d| d.poller.device()).collect();
    assert_eq!(names, vec!["plug", "meter", "old-plug"]);
}

#[test]
fn test_build_devices_rejects_bad_url() {
    let config = Config {
        server: ServerConfig::default(),
        devices: vec![device("plug", "ftp://10.0.0.2", DeviceModel::Switch)],
    };
    let http = HttpClients::new().unwrap();

    assert!(build_devices(&config, &http).is_err());
}

#[tokio::test]
async fn test_unreachable_devices_do_not_fail_the_scrape() {
    // Given: Two devices that nobody answers for
    let rpc_addr = closed_port().await;
    let http_addr = closed_port().await;
    let config = Config {
        server: ServerConfig::default(),
        devices: vec![
            device("plug", &format!("ws://{}", rpc_addr), DeviceModel::Switch),
            device("old-plug", &http_addr, DeviceModel::Gen1),
        ],
    };
    let http = HttpClients::new().unwrap();
    let devices = build_devices(&config, &http).unwrap();
    let metrics = MetricsCollector::new().unwrap();

    // When: Scraping
    let up = collect_all(&devices, &metrics).await;

    // Then: Nothing is up, but the scrape still renders
    assert_eq!(up, 0);
    let rendered = metrics.render().expect("Failed to render");
    assert!(rendered.contains("shelly_up{device=\"plug\"} 0"));
    assert!(rendered.contains("shelly_up{device=\"old-plug\"} 0"));
    assert!(rendered.contains("shelly_refresh_duration_seconds{device=\"plug\"}"));
    assert!(rendered.contains("shelly_last_refresh_timestamp_seconds{device=\"old-plug\"}"));
}

#[test]
fn test_metrics_rendering_is_stable() {
    // Given: A metrics collector with a metric set
    let metrics = MetricsCollector::new().unwrap();
    metrics.up.with_label_values(&["plug"]).set(1.0);

    // When: Rendering the same metrics twice
    let render1 = metrics.render().expect("First render failed");
    let render2 = metrics.render().expect("Second render failed");

    // Then: Both renderings should be identical
    assert_eq!(render1, render2, "Metrics rendering is not stable");
}
