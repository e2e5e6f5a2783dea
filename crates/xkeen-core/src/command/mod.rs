// ── Command API ──
//
// Every write against the panel is a `Command`. Commands run through the
// optimistic coordinator: speculate into the cache, commit the request,
// and always settle by invalidating the keys they touched.

mod optimistic;

use crate::model::{DaemonOutput, Server};
use crate::store::QueryKey;

pub use optimistic::{MutationCoordinator, PendingMutation, SettleGuard};

/// All write operations against an xkeen panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── Servers ──────────────────────────────────────────────────────
    /// Make `id` the active server. The daemon restarts afterwards.
    SelectServer { id: u32 },

    // ── Daemon ───────────────────────────────────────────────────────
    RestartDaemon,
    UpdateDaemon,
    ToggleWatchdog { active: bool },

    // ── Subscription ─────────────────────────────────────────────────
    UpdateSubscription { url: String },
    RefreshSubscription,
}

impl Command {
    /// Keys refetched once the command has settled.
    pub fn settles(&self) -> &'static [QueryKey] {
        match self {
            Self::SelectServer { .. } => &[QueryKey::Servers, QueryKey::Status],
            Self::RestartDaemon | Self::ToggleWatchdog { .. } => &[QueryKey::Status],
            Self::UpdateDaemon | Self::UpdateSubscription { .. } | Self::RefreshSubscription => {
                &[QueryKey::Subscription, QueryKey::Servers]
            }
        }
    }

    /// Short human-readable name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectServer { .. } => "select-server",
            Self::RestartDaemon => "restart",
            Self::UpdateDaemon => "update",
            Self::ToggleWatchdog { .. } => "toggle-watchdog",
            Self::UpdateSubscription { .. } => "update-subscription",
            Self::RefreshSubscription => "refresh-subscription",
        }
    }
}

/// Typed answer of a committed command.
#[derive(Debug, Clone)]
pub enum CommandResult {
    ServerSelected { server: Server, restarting: bool },
    Daemon(DaemonOutput),
    Watchdog { active: bool },
    Subscription { server_count: u32 },
}
