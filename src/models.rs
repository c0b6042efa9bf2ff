use serde::{Deserialize, Serialize};

/// S256 is the only challenge method we ever send.
pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and the challenge derived from it.
/// Lives for a single login attempt; the verifier is dropped once the code is exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

/// Persisted OAuth session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: i64, // epoch millis
}

impl AuthSession {
    /// Build a session from a token response, anchoring `expires_in` to `now_ms`.
    pub fn from_expires_in(
        access_token: String,
        refresh_token: String,
        expires_in_secs: i64,
        now_ms: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at_ms: now_ms.saturating_add(expires_in_secs.saturating_mul(1000)),
        }
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMatch {
    pub id: String,
    pub uri: String,
}

/// Search result; matches keep the order the service ranked them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub matches: Vec<TrackMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub name: String,
    pub public_url: String,
}
