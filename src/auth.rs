//! PKCE login lifecycle.
//!
//! 1. `begin_login` generates a verifier/challenge pair, stores the verifier
//!    and opens the provider's authorization page in a separate context
//!    (system browser) instead of navigating the current one.
//! 2. The provider redirects to `redirect_uri?code=...`; whoever receives it
//!    calls `complete_login_from_redirect` (or `complete_login`) which swaps
//!    the code for tokens and persists them.
//! 3. Every other consumer sharing the storage area learns about the new
//!    token through `on_external_session_change`, without a network call.
use crate::api::pkce;
use crate::config::Config;
use crate::error::AuthExchangeError;
use crate::models::{AuthSession, PkceChallenge};
use crate::session::AuthSessionStore;
use crate::storage::{SessionSignal, StorageArea, ACCESS_TOKEN_KEY};
use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedOut,
    AwaitingCallback,
    LoggedIn,
}

/// Opens the authorization URL somewhere the user can act on it.
pub trait LoginLauncher: Send + Sync {
    fn open(&self, url: &Url);
}

/// Opens the system browser; prints the URL if that fails.
pub struct BrowserLauncher;

impl LoginLauncher for BrowserLauncher {
    fn open(&self, url: &Url) {
        if let Err(e) = webbrowser::open(url.as_str()) {
            warn!("failed to open browser: {}", e);
            PrintLauncher.open(url);
        }
    }
}

pub struct PrintLauncher;

impl LoginLauncher for PrintLauncher {
    fn open(&self, url: &Url) {
        println!(
            "Open this URL in your browser and authorize the application:\n\n{}\n",
            url
        );
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Deserialize, Default)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    pub fn from_redirect_url(input: &str) -> Result<Self, AuthExchangeError> {
        let parsed = Url::parse(input.trim())
            .map_err(|e| AuthExchangeError::Denied(format!("invalid redirect url: {}", e)))?;
        let mut out = CallbackParams::default();
        for (k, v) in parsed.query_pairs() {
            match k.as_ref() {
                "code" if !v.is_empty() => out.code = Some(v.into_owned()),
                "error" => out.error = Some(v.into_owned()),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Build the authorization URL for one login attempt.
pub fn authorization_url(cfg: &Config, pkce: &PkceChallenge) -> Result<Url> {
    let mut url = Url::parse(&cfg.authorize_url())?;
    url.query_pairs_mut()
        .append_pair("client_id", &cfg.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &cfg.redirect_uri)
        .append_pair("scope", &cfg.scope())
        .append_pair("code_challenge_method", pkce.method)
        .append_pair("code_challenge", &pkce.challenge);
    Ok(url)
}

/// Stops the listener task when dropped.
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct AuthSessionManager {
    cfg: Config,
    client: Client,
    store: AuthSessionStore,
    state: Arc<Mutex<LoginState>>,
}

impl AuthSessionManager {
    pub fn new(cfg: Config, storage: Arc<dyn StorageArea>) -> Self {
        Self {
            cfg,
            client: Client::new(),
            store: AuthSessionStore::new(storage),
            state: Arc::new(Mutex::new(LoginState::LoggedOut)),
        }
    }

    pub fn store(&self) -> &AuthSessionStore {
        &self.store
    }

    pub fn state(&self) -> LoginState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(LoginState::LoggedOut)
    }

    fn set_state(&self, next: LoginState) {
        set_state(&self.state, next);
    }

    /// Start a login: persist a fresh verifier and open the authorization
    /// page through `launcher`. Returns the URL that was opened.
    pub fn begin_login(&self, launcher: &dyn LoginLauncher) -> Result<Url, AuthExchangeError> {
        let challenge = pkce::generate()?;
        self.store.save_verifier(&challenge.verifier)?;
        let url = authorization_url(&self.cfg, &challenge)?;
        self.set_state(LoginState::AwaitingCallback);
        info!("opening authorization page");
        launcher.open(&url);
        Ok(url)
    }

    /// Handle the redirect the provider sent the user to, using the stored verifier.
    pub async fn complete_login_from_redirect(
        &self,
        redirect_url: &str,
    ) -> Result<AuthSession, AuthExchangeError> {
        let params = CallbackParams::from_redirect_url(redirect_url)?;
        if let Some(err) = params.error {
            self.set_state(LoginState::LoggedOut);
            return Err(AuthExchangeError::Denied(err));
        }
        let code = params.code.ok_or(AuthExchangeError::MissingCode)?;
        let verifier = self
            .store
            .verifier()?
            .ok_or(AuthExchangeError::MissingVerifier)?;
        self.complete_login(&code, &verifier).await
    }

    /// Exchange an authorization code for tokens and persist the session.
    pub async fn complete_login(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<AuthSession, AuthExchangeError> {
        if code.is_empty() {
            return Err(AuthExchangeError::MissingCode);
        }
        if verifier.is_empty() {
            return Err(AuthExchangeError::MissingVerifier);
        }
        let params = [
            ("client_id", self.cfg.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        let tr = match self.post_token_form(&params).await {
            Ok(tr) => tr,
            Err(e) => {
                self.set_state(LoginState::LoggedOut);
                return Err(e);
            }
        };

        let session = AuthSession::from_expires_in(
            tr.access_token,
            tr.refresh_token.unwrap_or_default(),
            tr.expires_in,
            Utc::now().timestamp_millis(),
        );
        self.store.save(&session)?;
        self.store.clear_verifier()?;
        self.set_state(LoginState::LoggedIn);
        self.store.storage().notify(SessionSignal::TokenRefreshed {
            access_token: session.access_token.clone(),
        });
        info!("login complete; session valid until {}", session.expires_at_ms);
        Ok(session)
    }

    /// Swap the stored refresh token for a new access token.
    pub async fn refresh(&self) -> Result<AuthSession, AuthExchangeError> {
        let current = self.store.load()?;
        let refresh_token = current
            .map(|s| s.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthExchangeError::MissingRefreshToken)?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.cfg.client_id.as_str()),
        ];
        let tr = self.post_token_form(&params).await?;
        let session = AuthSession::from_expires_in(
            tr.access_token,
            tr.refresh_token.unwrap_or(refresh_token),
            tr.expires_in,
            Utc::now().timestamp_millis(),
        );
        self.store.save(&session)?;
        self.set_state(LoginState::LoggedIn);
        self.store.storage().notify(SessionSignal::TokenRefreshed {
            access_token: session.access_token.clone(),
        });
        debug!("access token refreshed");
        Ok(session)
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthExchangeError> {
        let resp = self
            .client
            .post(self.cfg.token_url())
            .form(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body: TokenErrorBody = resp.json().await.unwrap_or_default();
            let message = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| "Failed to exchange code for token.".to_string());
            warn!("token endpoint returned {}", status);
            return Err(AuthExchangeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Current session if still valid; an expired or partial record is
    /// cleared and reported as absent.
    pub fn get_valid_session(&self) -> Result<Option<AuthSession>> {
        let session = self.store.load_valid(Utc::now().timestamp_millis())?;
        resync_state(&self.state, session.is_some());
        Ok(session)
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self.get_valid_session()?.map(|s| s.access_token))
    }

    /// Clear every persisted auth key. Idempotent.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.set_state(LoginState::LoggedOut);
        info!("logged out");
        Ok(())
    }

    /// Used after a profile fetch failure: the session is presumed invalid.
    pub async fn logout_after(&self, delay: Duration) -> Result<()> {
        tokio::time::sleep(delay).await;
        self.logout()
    }

    /// Watch the shared storage area for session changes made by other
    /// contexts. `callback` receives the access token now in effect, or None
    /// when the session went away. Must be called inside a tokio runtime.
    pub fn on_external_session_change<F>(&self, callback: F) -> SessionSubscription
    where
        F: Fn(Option<String>) + Send + 'static,
    {
        let mut rx = self.store.storage().subscribe();
        let store = self.store.clone();
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let resync = |store: &AuthSessionStore| -> Option<Option<String>> {
                match store.load_valid(Utc::now().timestamp_millis()) {
                    Ok(s) => {
                        resync_state(&state, s.is_some());
                        Some(s.map(|s| s.access_token))
                    }
                    Err(e) => {
                        warn!("session resync failed: {}", e);
                        None
                    }
                }
            };
            loop {
                match rx.recv().await {
                    Ok(SessionSignal::StorageChanged { key }) if key == ACCESS_TOKEN_KEY => {
                        if let Some(token) = resync(&store) {
                            callback(token);
                        }
                    }
                    Ok(SessionSignal::TokenRefreshed { access_token }) => {
                        callback(Some(access_token));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        debug!("missed {} session signals; resyncing", n);
                        if let Some(token) = resync(&store) {
                            callback(token);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        SessionSubscription { handle }
    }
}

fn set_state(state: &Mutex<LoginState>, next: LoginState) {
    if let Ok(mut s) = state.lock() {
        *s = next;
    }
}

/// A pending login survives a resync that finds no session.
fn resync_state(state: &Mutex<LoginState>, has_session: bool) {
    if let Ok(mut s) = state.lock() {
        *s = match (has_session, *s) {
            (true, _) => LoginState::LoggedIn,
            (false, LoginState::AwaitingCallback) => LoginState::AwaitingCallback,
            (false, _) => LoginState::LoggedOut,
        };
    }
}
