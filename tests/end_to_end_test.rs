//! End-to-end tests against loopback mock devices
//!
//! A real websocket server plays a Gen2 device with digest auth; an axum
//! server plays a Gen1 device behind Basic auth.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use shelly_exporter::config::{DeviceConfig, DeviceModel};
use shelly_exporter::metrics::MetricsCollector;
use shelly_exporter::server::{collect_all, Device, HttpClients};
use shelly_exporter::shelly::client::MethodCall;
use shelly_exporter::shelly::types::RpcReply;
use shelly_exporter::shelly::{HttpStatusClient, RequestSource, RpcClient, WsTransport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const PASSWORD: &str = "s3cret";

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Whether `auth` is a valid credential for the mock's realm and password
fn auth_is_valid(auth: &Value) -> bool {
    let (Some(cnonce), Some(response)) = (auth["cnonce"].as_u64(), auth["response"].as_str())
    else {
        return false;
    };
    let ha1 = sha256_hex(&format!("admin:shelly:{}", PASSWORD));
    let ha2 = sha256_hex("dummy_method:dummy_uri");
    let expected = sha256_hex(&format!("{}:12345:1:{}:auth:{}", ha1, cnonce, ha2));

    auth["realm"] == "shelly"
        && auth["username"] == "admin"
        && auth["nonce"] == 12345
        && auth["algorithm"] == "SHA-256"
        && response == expected
}

/// Mock Gen2 device: challenges unauthenticated requests, answers the rest
/// with `status`. Returns every request it received once the client leaves.
async fn spawn_rpc_device(status: Value) -> (SocketAddr, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut requests = Vec::new();

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            requests.push(request.clone());

            let reply = if request.get("auth").is_some_and(auth_is_valid) {
                json!({ "result": status })
            } else {
                json!({"error": {"code": 401, "message": "{\"realm\":\"shelly\",\"nonce\":12345,\"nc\":1}"}})
            };
            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                break;
            }
        }
        requests
    });

    (addr, handle)
}

#[tokio::test]
async fn test_switch_status_with_digest_auth() {
    // Given: A mock device demanding digest auth
    let (addr, device) = spawn_rpc_device(json!({"apower": 12.34})).await;
    let transport =
        WsTransport::new(&format!("http://{}", addr), true, Duration::from_secs(2)).unwrap();
    assert_eq!(transport.url(), format!("ws://{}/rpc", addr));
    let mut client = RpcClient::new(
        "plug",
        transport,
        Some(SecretString::from(PASSWORD)),
        Duration::from_secs(2),
    );

    // When: Requesting the switch status
    let reply = client
        .call("Switch.GetStatus", json!({"id": 0}))
        .await
        .expect("device reply");

    // Then: The second (authenticated) reply is returned
    assert_eq!(reply, RpcReply::Json(json!({"result": {"apower": 12.34}})));

    // And: The stored credential reflects the challenge
    let credential = client.current_credential().expect("credential");
    assert_eq!(credential.realm, "shelly");
    assert_eq!(credential.nonce, 12345);
    assert!(client.auth_state().is_authenticated());

    drop(client);
    let requests = device.await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["method"], "Switch.GetStatus");
    assert!(requests[0].get("auth").is_none());
    assert!(auth_is_valid(&requests[1]["auth"]));
}

#[tokio::test]
async fn test_wrong_password_yields_error_reply() {
    let (addr, device) = spawn_rpc_device(json!({"apower": 1.0})).await;
    let transport =
        WsTransport::new(&format!("ws://{}/rpc", addr), true, Duration::from_secs(2)).unwrap();
    let mut client = RpcClient::new(
        "plug",
        transport,
        Some(SecretString::from("not-the-password")),
        Duration::from_secs(2),
    );

    let reply = client.call("Switch.GetStatus", json!({"id": 0})).await.unwrap();

    assert_eq!(reply.error().unwrap().code, 401);
    drop(client);
    assert_eq!(device.await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_device_is_a_hard_failure() {
    // Bind and drop to get a port nothing listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let transport =
        WsTransport::new(&format!("ws://{}", addr), true, Duration::from_secs(1)).unwrap();
    let mut client = RpcClient::new("gone", transport, None, Duration::from_secs(2));

    let result = client.call("Switch.GetStatus", json!({"id": 0})).await;

    assert!(result.is_err());
}

fn device_config(name: &str, url: String, model: DeviceModel) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        url,
        model,
        channel: 0,
        username: "admin".to_string(),
        password: Some(SecretString::from(PASSWORD)),
        timeout_seconds: 2,
        min_poll_interval_ms: 800,
        ignore: vec![],
        derive_current: false,
        verify_tls: true,
    }
}

#[tokio::test]
async fn test_scrape_publishes_switch_readings() {
    // Given: A configured switch device behind digest auth
    let (addr, _device) = spawn_rpc_device(json!({
        "id": 0,
        "output": true,
        "apower": 12.34,
        "voltage": 230.1,
        "current": 0.054,
        "aenergy": {"total": 4321.5},
        "temperature": {"tC": 41.2}
    }))
    .await;
    let config = device_config("plug", format!("http://{}", addr), DeviceModel::Switch);
    let http = HttpClients::new().unwrap();
    let devices = vec![Device::new(config, &http).unwrap()];
    let metrics = MetricsCollector::new().unwrap();

    // When: A scrape collects all devices
    let up = collect_all(&devices, &metrics).await;

    // Then: The readings are rendered
    assert_eq!(up, 1);
    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("shelly_power_watts{device=\"plug\"} 12.34"));
    assert!(rendered.contains("shelly_energy_watt_hours_total{device=\"plug\"} 4321.5"));
    assert!(rendered.contains("shelly_output_on{device=\"plug\"} 1"));
    assert!(rendered.contains("shelly_up{device=\"plug\"} 1"));
}

#[derive(Clone)]
struct Gen1State {
    hits: Arc<AtomicUsize>,
}

async fn gen1_status(State(state): State<Gen1State>, headers: HeaderMap) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    // base64("admin:s3cret")
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Basic YWRtaW46czNjcmV0");

    if !authorized {
        return (StatusCode::UNAUTHORIZED, "401 Unauthorized").into_response();
    }

    Json(json!({
        "relays": [{"ison": false}],
        "meters": [{"power": 7.5, "total": 1200}],
        "temperature": 35.0,
        "overtemperature": false
    }))
    .into_response()
}

async fn spawn_gen1_device() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/status", get(gen1_status))
        .with_state(Gen1State { hits: hits.clone() });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, hits)
}

#[tokio::test]
async fn test_gen1_status_with_basic_auth() {
    let (addr, hits) = spawn_gen1_device().await;
    let mut client = HttpStatusClient::new(
        "garage",
        reqwest::Client::new(),
        &format!("{}/", addr),
        "admin",
        Some(SecretString::from(PASSWORD)),
        Duration::from_secs(2),
    )
    .unwrap();

    let reply = client
        .request(&MethodCall::new("/status", Value::Null))
        .await
        .unwrap();

    assert!(reply.is_success());
    assert_eq!(reply.result().unwrap()["meters"][0]["power"], 7.5);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gen1_unauthorized_is_terminal() {
    let (addr, hits) = spawn_gen1_device().await;
    let mut client = HttpStatusClient::new(
        "garage",
        reqwest::Client::new(),
        &format!("http://{}", addr),
        "admin",
        Some(SecretString::from("wrong")),
        Duration::from_secs(2),
    )
    .unwrap();

    let reply = client
        .request(&MethodCall::new("/status", Value::Null))
        .await
        .unwrap();

    assert_eq!(reply.error().unwrap().code, 401);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scrape_publishes_gen1_readings() {
    let (addr, _hits) = spawn_gen1_device().await;
    let config = device_config("garage", format!("http://{}", addr), DeviceModel::Gen1);
    let http = HttpClients::new().unwrap();
    let devices = vec![Device::new(config, &http).unwrap()];
    let metrics = MetricsCollector::new().unwrap();

    assert_eq!(collect_all(&devices, &metrics).await, 1);

    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("shelly_power_watts{device=\"garage\"} 7.5"));
    assert!(rendered.contains("shelly_energy_watt_minutes_total{device=\"garage\"} 1200"));
    assert!(rendered.contains("shelly_output_on{device=\"garage\"} 0"));
}
