// stockroom-api: Async Rust client for the catalog admin REST + WebSocket API

pub mod client;
pub mod envelope;
pub mod error;
pub mod transport;
pub mod websocket;

pub use client::CatalogClient;
pub use envelope::ApiEnvelope;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
