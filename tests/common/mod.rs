//! Shared test doubles for the transport and request-source seams.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use shelly_exporter::error::{ExporterError, Result};
use shelly_exporter::shelly::types::RpcReply;
use shelly_exporter::shelly::{MethodCall, RequestSource, Transport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake device does when a frame is awaited
pub enum Frame {
    Text(String),
    Fail,
    Hang,
}

impl Frame {
    pub fn json(value: Value) -> Self {
        Frame::Text(value.to_string())
    }
}

#[derive(Default)]
pub struct FakeState {
    pub connected: bool,
    pub connect_calls: usize,
    pub connect_failures: usize,
    pub send_failures: usize,
    pub sent: Vec<String>,
    pub frames: VecDeque<Frame>,
}

impl FakeState {
    /// Sent frames decoded as JSON
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("sent frame is JSON"))
            .collect()
    }
}

/// In-memory transport; clones share the same state
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn with_frames(frames: Vec<Frame>) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().frames = frames.into();
        transport
    }

    pub fn failing_connect(failures: usize) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().connect_failures = failures;
        transport
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent_json()
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ExporterError::Transport("connection refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn send_frame(&mut self, message: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.send_failures > 0 {
            state.send_failures -= 1;
            return Err(ExporterError::Transport("broken pipe".to_string()));
        }
        state.sent.push(message.to_string());
        Ok(())
    }

    async fn receive_frame(&mut self) -> Result<String> {
        let frame = self.state.lock().unwrap().frames.pop_front();
        match frame {
            Some(Frame::Text(text)) => Ok(text),
            Some(Frame::Fail) | None => Err(ExporterError::ConnectionClosed),
            Some(Frame::Hang) => {
                std::future::pending::<()>().await;
                Err(ExporterError::ConnectionClosed)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.state.lock().unwrap().connected = false;
    }
}

/// Request source answering from a script, recording every call
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub script: Arc<Mutex<VecDeque<Result<RpcReply>>>>,
    pub delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<RpcReply>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestSource for ScriptedSource {
    async fn request(&mut self, call: &MethodCall) -> Result<RpcReply> {
        self.calls.lock().unwrap().push(call.method.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(RpcReply::Json(serde_json::json!({"result": {}}))))
    }
}

pub fn challenge_frame(realm: &str, nonce: u64) -> Frame {
    let message = serde_json::json!({"realm": realm, "nonce": nonce, "nc": 1}).to_string();
    Frame::json(serde_json::json!({"error": {"code": 401, "message": message}}))
}
