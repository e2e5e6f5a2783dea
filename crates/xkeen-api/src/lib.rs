//! Async Rust client for the xkeen-panel control API.
//!
//! - **[`ApiClient`]**: request/response calls (`/api/status`,
//!   `/api/servers`, mutations) with bearer authentication taken from a
//!   [`CredentialStore`]. A 401 clears the stored credential.
//! - **[`sse`]**: server-sent event decoding and the [`EventTransport`]
//!   seam used by the long-lived push channels.
//! - **[`models`]**: wire types shared with `xkeen-core`.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod sse;
pub mod transport;

pub use auth::{CredentialStore, MemoryCredentialStore};
pub use client::ApiClient;
pub use error::Error;
pub use sse::{EventStream, EventTransport, SseDecoder, SseEvent, StreamEndpoint};
pub use transport::{TlsMode, TransportConfig};
