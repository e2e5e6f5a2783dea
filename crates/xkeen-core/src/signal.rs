// ── Session-level authentication signal ──
//
// Raised by any component that discovers the credential is gone. The
// session watches it and tears everything down.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LogoutReason {
    /// The panel answered 401.
    #[strum(serialize = "session expired")]
    Unauthorized,
    /// A push channel found no credential to reconnect with.
    #[strum(serialize = "credential missing")]
    CredentialMissing,
    /// Explicit logout.
    #[strum(serialize = "logged out")]
    UserRequested,
}

/// One-shot logout signal. The first reason wins.
#[derive(Debug, Clone)]
pub struct SessionSignal {
    tx: Arc<watch::Sender<Option<LogoutReason>>>,
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Force the session to log out. Returns `false` if it already was.
    pub fn force_logout(&self, reason: LogoutReason) -> bool {
        let fired = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if fired {
            info!(%reason, "forcing logout");
        }
        fired
    }

    pub fn reason(&self) -> Option<LogoutReason> {
        *self.tx.borrow()
    }

    pub fn is_logged_out(&self) -> bool {
        self.reason().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LogoutReason>> {
        self.tx.subscribe()
    }

    /// Resolve once a logout has been forced.
    pub async fn logged_out(&self) -> LogoutReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives as long as `self`.
            if rx.changed().await.is_err() {
                return LogoutReason::UserRequested;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_wins() {
        let signal = SessionSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.logged_out().await })
        };

        assert!(signal.force_logout(LogoutReason::Unauthorized));
        assert!(!signal.force_logout(LogoutReason::UserRequested));

        assert_eq!(waiter.await.ok(), Some(LogoutReason::Unauthorized));
        assert_eq!(signal.reason(), Some(LogoutReason::Unauthorized));
    }
}
