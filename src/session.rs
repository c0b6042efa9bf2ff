use crate::models::AuthSession;
use crate::storage::{
    StorageArea, ACCESS_TOKEN_KEY, ALL_KEYS, EXPIRY_KEY, REFRESH_TOKEN_KEY, VERIFIER_KEY,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Sole owner of the persisted auth state. Everything else only sees
/// copies handed out by `load`/`load_valid`.
#[derive(Clone)]
pub struct AuthSessionStore {
    storage: Arc<dyn StorageArea>,
}

impl AuthSessionStore {
    pub fn new(storage: Arc<dyn StorageArea>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageArea> {
        &self.storage
    }

    /// Read the persisted session regardless of expiry. A record with no
    /// access token or an unparsable expiry counts as absent.
    pub fn load(&self) -> Result<Option<AuthSession>> {
        let access_token = match self.storage.get(ACCESS_TOKEN_KEY)? {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };
        let expires_at_ms = match self
            .storage
            .get(EXPIRY_KEY)?
            .and_then(|s| s.trim().parse::<i64>().ok())
        {
            Some(e) => e,
            None => return Ok(None),
        };
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?.unwrap_or_default();
        Ok(Some(AuthSession {
            access_token,
            refresh_token,
            expires_at_ms,
        }))
    }

    /// Expiry and refresh token go in before the access token, so anyone
    /// reacting to the access-token change reads a complete record.
    pub fn save(&self, session: &AuthSession) -> Result<()> {
        self.storage
            .set(EXPIRY_KEY, &session.expires_at_ms.to_string())?;
        self.storage.set(REFRESH_TOKEN_KEY, &session.refresh_token)?;
        self.storage.set(ACCESS_TOKEN_KEY, &session.access_token)?;
        Ok(())
    }

    /// Remove every auth key, verifier included. Safe to call repeatedly.
    pub fn clear(&self) -> Result<()> {
        for key in ALL_KEYS {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    /// Session if present and `now_ms < expires_at`. A stored access token
    /// that is expired or has no usable expiry clears the session keys.
    /// Without an access token nothing is cleared: the other keys may belong
    /// to a `save` still in progress elsewhere. A pending verifier is left alone.
    pub fn load_valid(&self, now_ms: i64) -> Result<Option<AuthSession>> {
        let has_access = self
            .storage
            .get(ACCESS_TOKEN_KEY)?
            .map_or(false, |t| !t.is_empty());
        if !has_access {
            return Ok(None);
        }
        match self.load()? {
            Some(s) if s.is_valid_at(now_ms) => Ok(Some(s)),
            other => {
                if other.is_some() {
                    debug!("persisted session expired; clearing");
                }
                self.clear_session()?;
                Ok(None)
            }
        }
    }

    fn clear_session(&self) -> Result<()> {
        for key in [ACCESS_TOKEN_KEY, EXPIRY_KEY, REFRESH_TOKEN_KEY] {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    pub fn save_verifier(&self, verifier: &str) -> Result<()> {
        self.storage.set(VERIFIER_KEY, verifier)
    }

    pub fn verifier(&self) -> Result<Option<String>> {
        Ok(self.storage.get(VERIFIER_KEY)?.filter(|v| !v.is_empty()))
    }

    pub fn clear_verifier(&self) -> Result<()> {
        self.storage.remove(VERIFIER_KEY)
    }
}
