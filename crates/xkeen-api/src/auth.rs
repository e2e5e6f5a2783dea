use std::sync::{PoisonError, RwLock};

use secrecy::SecretString;

/// Holder of the single bearer token of a panel session.
///
/// The token's absence is what "logged out" means everywhere in the
/// client: the request client sends no `Authorization` header, push
/// channels refuse to (re)connect, and the session layer forces a new
/// login. Implementations must be cheap to call from any task.
pub trait CredentialStore: Send + Sync {
    /// The current token, if any.
    fn token(&self) -> Option<SecretString>;

    /// Replace the stored token.
    fn store(&self, token: SecretString);

    /// Forget the stored token.
    fn clear(&self);

    /// Whether a token is currently stored.
    fn is_present(&self) -> bool {
        self.token().is_some()
    }
}

/// Process-local credential store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(SecretString::from(token.into()))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<SecretString> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, token: SecretString) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn store_and_clear() {
        let store = MemoryCredentialStore::new();
        assert!(!store.is_present());

        store.store(SecretString::from("abc".to_string()));
        assert_eq!(store.token().unwrap().expose_secret(), "abc");

        store.clear();
        assert!(store.token().is_none());
    }
}
