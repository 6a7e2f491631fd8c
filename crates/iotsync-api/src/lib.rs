// iotsync-api: async transport layer for the IoT device-management backend
// (REST, STOMP over WebSocket, raw WebSocket, chunked event streams)

pub mod auth;
pub mod client;
mod endpoints;
pub mod error;
pub mod models;
pub mod sse;
pub mod stomp;
pub mod stream;
pub mod transport;
pub mod websocket;

pub use auth::{Anonymous, SharedToken, StaticToken, TokenSource};
pub use client::ApiClient;
pub use error::Error;
pub use models::{
    DeviceRecord, DeviceStatsRecord, NotificationRecord, OnboardingFile, OnboardingRequest,
    ProgressRecord, StepDetailsRecord, StreamErrorRecord,
};
pub use sse::{EventStreamParser, StreamEvent};
pub use stream::EventStream;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{ChannelMessage, ChannelOptions, RawSocketChannel, StompChannel};
