pub mod auth;
pub mod client;
pub mod connection;
pub mod http;
pub mod poller;
pub mod types;

pub use client::{MethodCall, RequestSource, RpcClient};
pub use connection::{Connection, Transport, WsTransport};
pub use http::HttpStatusClient;
pub use poller::{PollRateLimiter, PollResult};
