//! WebSocket Connection Management
//!
//! This module handles the persistent socket to one Gen2 device. A single
//! long-lived connection is kept open and reused by every request; it is
//! re-established on demand when a send fails.
//!
//! [`Transport`] is the seam between the request cycle and the wire, so the
//! request logic can be exercised against in-memory fakes.

use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Total tries for one send, reconnecting between tries
pub const SEND_ATTEMPTS: u32 = 3;

const DEFAULT_RPC_PATH: &str = "/rpc";

/// A bidirectional, message-framed link to a device
#[async_trait]
pub trait Transport: Send {
    /// Open the link. Failure is reported, never fatal.
    async fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Write one frame on the open link
    async fn send_frame(&mut self, message: &str) -> Result<()>;

    /// Wait for the next complete frame
    async fn receive_frame(&mut self) -> Result<String>;

    /// Drop the link; the next send reconnects
    async fn disconnect(&mut self);
}

/// Rewrite an endpoint URL to its websocket form.
///
/// `http` becomes `ws`, `https` becomes `wss`, a bare host gets `ws://`,
/// and an empty path defaults to `/rpc`.
pub fn normalize_endpoint(url: &str) -> Result<String> {
    let url = url.trim();
    if url.contains(['?', '#']) {
        return Err(ExporterError::Config(format!(
            "Query or fragment not supported in device URL: {}",
            url
        )));
    }
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("ws".to_string(), url),
    };

    let scheme = match scheme.as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ExporterError::Config(format!(
                "Unsupported URL scheme '{}' in {}",
                other, url
            )))
        }
    };

    let (host, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    if host.is_empty() {
        return Err(ExporterError::Config(format!("Missing host in URL: {}", url)));
    }

    let path = if path.is_empty() || path == "/" {
        DEFAULT_RPC_PATH
    } else {
        path
    };

    Ok(format!("{}://{}{}", scheme, host, path))
}

/// Websocket transport built on tokio-tungstenite
pub struct WsTransport {
    url: String,
    verify_tls: bool,
    connect_timeout: Duration,
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new(url: &str, verify_tls: bool, connect_timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: normalize_endpoint(url)?,
            verify_tls,
            connect_timeout,
            stream: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn open(url: &str, verify_tls: bool) -> Result<WsStream> {
    let (ws_stream, _) = if url.starts_with("wss://") && !verify_tls {
        // Custom TLS connector for self-signed certs
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| ExporterError::Transport(e.to_string()))?;

        let connector = tokio_tungstenite::Connector::NativeTls(connector);
        tokio_tungstenite::connect_async_tls_with_config(url, None, false, Some(connector)).await?
    } else {
        connect_async(url).await?
    };

    Ok(ws_stream)
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self) -> Result<()> {
        debug!("Connecting to {}", self.url);
        let stream = tokio::time::timeout(self.connect_timeout, open(&self.url, self.verify_tls))
            .await
            .map_err(|_| ExporterError::Timeout(self.connect_timeout))??;
        self.stream = Some(stream);
        info!("Connected to {}", self.url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send_frame(&mut self, message: &str) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ExporterError::ConnectionClosed)?;
        stream.send(Message::Text(message.to_string().into())).await?;
        Ok(())
    }

    async fn receive_frame(&mut self) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(ExporterError::ConnectionClosed)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned())
                }
                Some(Ok(Message::Close(_))) | None => return Err(ExporterError::ConnectionClosed),
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ExporterError::WebSocket(e)),
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
            debug!("Closed connection to {}", self.url);
        }
    }
}

/// One persistent device connection with bounded reconnection on send
pub struct Connection<T: Transport> {
    transport: T,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Open the connection, reporting but not raising a failure.
    pub async fn connect(&mut self) -> bool {
        match self.transport.connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Connect failed: {}", e);
                false
            }
        }
    }

    /// Send one message, reconnecting between tries.
    ///
    /// Gives up after [`SEND_ATTEMPTS`] tries; the caller must treat the
    /// request as failed and not retry further.
    pub async fn send(&mut self, message: &str) -> Result<()> {
        for attempt in 1..=SEND_ATTEMPTS {
            if !self.transport.is_connected() && !self.connect().await {
                continue;
            }

            match self.transport.send_frame(message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Send attempt {}/{} failed: {}", attempt, SEND_ATTEMPTS, e);
                    self.transport.disconnect().await;
                }
            }
        }

        Err(ExporterError::SendFailed {
            attempts: SEND_ATTEMPTS,
        })
    }

    /// Wait for one message. A failure drops the link and is not retried here.
    pub async fn receive(&mut self) -> Result<String> {
        match self.transport.receive_frame().await {
            Ok(text) => Ok(text),
            Err(e) => {
                self.transport.disconnect().await;
                Err(e)
            }
        }
    }

    pub async fn reset(&mut self) {
        self.transport.disconnect().await;
    }
}
