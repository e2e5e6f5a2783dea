// xkeen-core: live session state between xkeen-api and consumers (CLI).

pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod probe;
pub mod push;
pub mod request;
pub mod session;
pub mod signal;
pub mod store;
pub mod stream;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult, MutationCoordinator, PendingMutation, SettleGuard};
pub use config::{SessionConfig, TlsVerification};
pub use error::CoreError;
pub use probe::LatencyProbe;
pub use push::{ChannelState, PushChannel, apply_push_event};
pub use request::RequestClient;
pub use session::{MIN_PASSWORD_LEN, Session};
pub use signal::{LogoutReason, SessionSignal};
pub use store::{CacheKey, LogsKey, Query, QueryCache, QueryKey, ServersKey, StatusKey, SubscriptionKey};
pub use stream::{CacheStream, CacheWatchStream, ListenerHandle};

pub use model::{
    DaemonOutput, Latency, LogBuffer, Protocol, Server, Status, SubscriptionInfo, TotpEnrollment,
};

// Credential plumbing consumers need to build a session.
pub use xkeen_api::{CredentialStore, MemoryCredentialStore};
