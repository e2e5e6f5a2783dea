// Durable credential store backed by the system keyring.
//
// The token lives in memory for the whole run; the keyring only persists
// it between runs. Keyring failures are logged and never surface to the
// session: losing persistence is not a reason to log out.

use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use xkeen_core::CredentialStore;

/// Keyring service name. Accounts are `<profile>/token`.
pub const KEYRING_SERVICE: &str = "xkeen";

/// Environment variable overriding the stored token for one run.
pub const TOKEN_ENV: &str = "XKEEN_TOKEN";

pub struct KeyringCredentialStore {
    account: String,
    entry: Option<keyring::Entry>,
    cached: RwLock<Option<SecretString>>,
}

impl KeyringCredentialStore {
    /// Open the store of `profile`. `XKEEN_TOKEN`, when set, takes the
    /// place of the keyring token and is never written back.
    pub fn for_profile(profile: &str) -> Self {
        let account = format!("{profile}/token");

        if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            debug!(%account, "using token from {TOKEN_ENV}");
            return Self::detached(account, Some(SecretString::from(token)));
        }

        let entry = match keyring::Entry::new(KEYRING_SERVICE, &account) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(%account, error = %e, "keyring unavailable, token will not persist");
                None
            }
        };
        let cached = entry.as_ref().and_then(|entry| match entry.get_password() {
            Ok(token) => Some(SecretString::from(token)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(%account, error = %e, "failed to read token from keyring");
                None
            }
        });

        Self {
            account,
            entry,
            cached: RwLock::new(cached),
        }
    }

    /// A store that never touches the keyring.
    pub fn detached(account: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            account: account.into(),
            entry: None,
            cached: RwLock::new(token),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn is_persistent(&self) -> bool {
        self.entry.is_some()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn token(&self) -> Option<SecretString> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, token: SecretString) {
        if let Some(entry) = &self.entry {
            if let Err(e) = entry.set_password(token.expose_secret()) {
                warn!(account = %self.account, error = %e, "failed to save token to keyring");
            }
        }
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        let had_token = self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if !had_token {
            return;
        }
        if let Some(entry) = &self.entry {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!(account = %self.account, error = %e, "failed to remove token from keyring"),
            }
        }
    }
}
