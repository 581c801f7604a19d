//! Shelly Prometheus Exporter
//!
//! A Prometheus metrics exporter for Shelly power meters, plugs and relays.
//!
//! # Overview
//!
//! Gen2 devices are polled with JSON-RPC over a persistent websocket,
//! including the device's digest challenge-response authentication. Gen1
//! devices are polled with a plain HTTP `GET /status`. Selected fields are
//! republished as gauges whenever Prometheus scrapes `/metrics`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   WebSocket RPC    ┌──────────────────────────┐
//! │ Shelly Gen2 │ ◄────────────────► │         Exporter         │
//! └─────────────┘   digest auth      │  ┌────────────────────┐  │
//!                                    │  │ PollRateLimiter    │  │      HTTP      ┌────────────┐
//! ┌─────────────┐   HTTP GET         │  │  └ RpcClient / Http│  │ ◄────────────► │ Prometheus │
//! │ Shelly Gen1 │ ◄────────────────► │  └────────────────────┘  │   /metrics     └────────────┘
//! └─────────────┘   /status          │  ┌────────────────────┐  │
//!                                    │  │ collectors+Metrics │  │
//!                                    │  └────────────────────┘  │
//!                                    └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`shelly`] - Transports, RPC request cycle, digest auth and rate limiting
//! - [`collectors`] - Per-model field tables and mapping into gauges
//! - [`metrics`] - Prometheus metric definitions
//! - [`server`] - HTTP server and scrape-driven collection
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use shelly_exporter::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod shelly;
