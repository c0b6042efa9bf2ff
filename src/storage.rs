//! Key/value storage area shared by every live session consumer, plus the
//! signals consumers use to notice each other's writes.
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub const VERIFIER_KEY: &str = "spotify_pkce_verifier";
pub const ACCESS_TOKEN_KEY: &str = "spotify_access_token";
pub const EXPIRY_KEY: &str = "spotify_token_expiry";
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";

pub const ALL_KEYS: [&str; 4] = [VERIFIER_KEY, ACCESS_TOKEN_KEY, EXPIRY_KEY, REFRESH_TOKEN_KEY];

const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// A key was written or removed.
    StorageChanged { key: String },
    /// A login or refresh produced a new access token.
    TokenRefreshed { access_token: String },
}

/// Storage medium. Implementations broadcast `StorageChanged` for every
/// mutation that actually changes a key.
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<SessionSignal>;
    fn notify(&self, signal: SessionSignal);
}

/// Signal fan-out used by the storage implementations.
#[derive(Debug)]
pub struct SignalHub {
    tx: broadcast::Sender<SessionSignal>,
}

impl SignalHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.tx.subscribe()
    }

    pub fn send(&self, signal: SessionSignal) {
        // no receivers is fine
        let _ = self.tx.send(signal);
    }

    pub fn changed(&self, key: &str) {
        self.send(SessionSignal::StorageChanged { key: key.to_string() });
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process storage area. Clone an `Arc<MemoryStorage>` into each context.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
    hub: SignalHub,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let changed = {
            let mut map = self.map.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
            map.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        };
        if changed {
            self.hub.changed(key);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let removed = {
            let mut map = self.map.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
            map.remove(key).is_some()
        };
        if removed {
            self.hub.changed(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.hub.subscribe()
    }

    fn notify(&self, signal: SessionSignal) {
        self.hub.send(signal);
    }
}
