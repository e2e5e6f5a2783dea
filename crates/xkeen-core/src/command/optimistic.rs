// Speculate / commit / settle.
//
// `speculate` patches the cache with the expected outcome and arms a
// `SettleGuard`; `commit` sends the request. Whatever happens to the
// pending mutation afterwards (success, failure, or being dropped) the
// guard invalidates the command's keys and the refetcher restores the
// authoritative values.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Command, CommandResult};
use crate::error::CoreError;
use crate::model::{mark_active, with_restarting, with_watchdog};
use crate::request::RequestClient;
use crate::store::{QueryCache, QueryKey, ServersKey, StatusKey};

/// Runs commands against the session cache.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: Arc<QueryCache>,
    client: RequestClient,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<QueryCache>, client: RequestClient) -> Self {
        Self { cache, client }
    }

    /// Apply the command's expected post-condition to the cache and return
    /// the pending mutation. Nothing is sent until it is committed.
    pub fn speculate(&self, command: Command) -> PendingMutation {
        let settle = SettleGuard::new(Arc::clone(&self.cache), command.settles());

        match &command {
            Command::SelectServer { id } => {
                let id = *id;
                self.cache
                    .patch::<ServersKey, _>(|servers| servers.and_then(|s| mark_active(s, id)));
                self.cache
                    .patch::<StatusKey, _>(|status| status.and_then(|s| with_restarting(s, true)));
            }
            Command::RestartDaemon => {
                self.cache
                    .patch::<StatusKey, _>(|status| status.and_then(|s| with_restarting(s, true)));
            }
            Command::ToggleWatchdog { active } => {
                let active = *active;
                self.cache
                    .patch::<StatusKey, _>(|status| status.and_then(|s| with_watchdog(s, active)));
            }
            Command::UpdateDaemon
            | Command::UpdateSubscription { .. }
            | Command::RefreshSubscription => {}
        }
        debug!(command = command.name(), "speculation applied");

        PendingMutation {
            command,
            client: self.client.clone(),
            settle,
        }
    }

    /// Speculate and commit in one go.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.speculate(command).commit().await
    }
}

/// A speculated command waiting to be sent. Dropping it settles the cache
/// without sending anything.
#[must_use = "a pending mutation does nothing until committed"]
pub struct PendingMutation {
    command: Command,
    client: RequestClient,
    settle: SettleGuard,
}

impl PendingMutation {
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Send the request, then settle.
    pub async fn commit(self) -> Result<CommandResult, CoreError> {
        let Self {
            command,
            client,
            settle,
        } = self;

        let result = send(&client, &command).await;
        match &result {
            Ok(_) => debug!(command = command.name(), "command committed"),
            Err(e) => warn!(command = command.name(), error = %e, "command failed"),
        }

        drop(settle);
        result
    }
}

async fn send(client: &RequestClient, command: &Command) -> Result<CommandResult, CoreError> {
    match command {
        Command::SelectServer { id } => {
            let response = client.select_server(*id).await.map_err(|e| match e {
                CoreError::Rejected { status: 404, .. } => CoreError::ServerNotFound { id: *id },
                other => other,
            })?;
            Ok(CommandResult::ServerSelected {
                server: response.server,
                restarting: response.restarting,
            })
        }
        Command::RestartDaemon => Ok(CommandResult::Daemon(client.restart_daemon().await?)),
        Command::UpdateDaemon => Ok(CommandResult::Daemon(client.update_daemon().await?)),
        Command::ToggleWatchdog { active } => {
            let state = client.toggle_watchdog(*active).await?;
            Ok(CommandResult::Watchdog {
                active: state.active,
            })
        }
        Command::UpdateSubscription { url } => {
            let url = url.trim();
            if url.is_empty() {
                return Err(CoreError::ValidationFailed {
                    message: "subscription URL is empty".into(),
                });
            }
            let update = client.update_subscription(url).await?;
            Ok(CommandResult::Subscription {
                server_count: update.server_count,
            })
        }
        Command::RefreshSubscription => {
            let update = client.refresh_subscription().await?;
            Ok(CommandResult::Subscription {
                server_count: update.server_count,
            })
        }
    }
}

/// Invalidates its keys when dropped.
#[must_use]
pub struct SettleGuard {
    cache: Arc<QueryCache>,
    keys: &'static [QueryKey],
}

impl SettleGuard {
    pub fn new(cache: Arc<QueryCache>, keys: &'static [QueryKey]) -> Self {
        Self { cache, keys }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        for key in self.keys {
            self.cache.invalidate_key(*key);
        }
    }
}
