//! Credential handling for the remote storage service.
//!
//! The broker owns a short-lived access credential and, when configured, a
//! long-lived refresh credential. Collaborators ask for a [`Session`] per
//! call batch and report back when the service rejects one; the broker then
//! forces a refresh on the next request.

use crate::config::{AuthConfig, RemoteConfig};
use crate::core::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

// ============================================================================
// Credential & Session
// ============================================================================

/// A short-lived access token plus when it was obtained. Persisted to the
/// token cache so a refreshed token survives process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    /// A credential past the staleness window is refreshed proactively.
    /// A clock that moved backwards counts as stale.
    pub fn is_stale(&self, window: Duration) -> bool {
        match Utc::now().signed_duration_since(self.obtained_at).to_std() {
            Ok(age) => age >= window,
            Err(_) => true,
        }
    }
}

/// Handle for one or more remote calls. Cheap to clone; carries no state
/// beyond the token it was built from.
#[derive(Clone)]
pub struct Session {
    access_token: String,
}

impl Session {
    fn new(access_token: String) -> Self {
        Self { access_token }
    }

    pub fn token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token stays out of logs
        f.debug_struct("Session").field("access_token", &"***").finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

// ============================================================================
// Credential Broker
// ============================================================================

#[derive(Default)]
struct BrokerState {
    cached: Option<Credential>,
    /// Set in access-token-only mode once the static token is rejected;
    /// there is nothing left to fall back to after that.
    static_rejected: bool,
}

pub struct CredentialBroker {
    auth: AuthConfig,
    token_url: String,
    staleness_window: Duration,
    token_cache: Option<PathBuf>,
    http: reqwest::blocking::Client,
    state: Mutex<BrokerState>,
}

impl CredentialBroker {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                StoreError::CredentialUnavailable(format!("failed to build HTTP client: {}", e))
            })?;

        // Prefer a previously refreshed credential from the cache file; it
        // is newer than whatever the environment was configured with.
        let mut cached = config
            .token_cache
            .as_deref()
            .and_then(load_cached_credential);
        if cached.is_none() {
            cached = config.auth.access_token.as_ref().map(|token| Credential {
                access_token: token.clone(),
                obtained_at: Utc::now(),
            });
        }

        Ok(Self {
            auth: config.auth.clone(),
            token_url: config.token_url.clone(),
            staleness_window: config.staleness_window,
            token_cache: config.token_cache.clone(),
            http,
            state: Mutex::new(BrokerState {
                cached,
                static_rejected: false,
            }),
        })
    }

    /// Returns a session built from the cached credential when it is still
    /// fresh; otherwise exchanges the refresh credential for a new one.
    ///
    /// The whole check-then-refresh sequence runs under the state lock, so
    /// concurrent callers finding a stale credential share a single
    /// exchange instead of each issuing their own.
    pub fn get_session(&self) -> Result<Session> {
        let mut state = self.state.lock()?;

        if let Some(cred) = state.cached.as_ref() {
            if !cred.is_stale(self.staleness_window) {
                return Ok(Session::new(cred.access_token.clone()));
            }
        }

        if !self.auth.can_refresh() {
            if state.static_rejected {
                return Err(StoreError::CredentialUnavailable(
                    "access token was rejected and no refresh credential is configured"
                        .to_string(),
                ));
            }
            // Access-token-only mode: the static token is all there is,
            // stale or not.
            if let Some(token) = self.auth.access_token.as_ref() {
                return Ok(Session::new(token.clone()));
            }
            return Err(StoreError::CredentialUnavailable(
                "no remote credentials configured".to_string(),
            ));
        }

        let cred = self.exchange_refresh_token()?;
        self.persist_credential(&cred);
        let session = Session::new(cred.access_token.clone());
        state.cached = Some(cred);
        info!("remote access credential refreshed");
        Ok(session)
    }

    /// Called by the remote store when the service rejected a session this
    /// broker issued. Invalidates the cached credential so the next
    /// `get_session` refreshes.
    pub fn report_rejected(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock()?;
        if state
            .cached
            .as_ref()
            .is_some_and(|cred| cred.access_token == session.token())
        {
            state.cached = None;
            warn!("remote session rejected; cached credential invalidated");
        }
        if !self.auth.can_refresh() && self.auth.access_token.as_deref() == Some(session.token()) {
            state.static_rejected = true;
        }
        Ok(())
    }

    fn exchange_refresh_token(&self) -> Result<Credential> {
        let missing =
            || StoreError::CredentialUnavailable("refresh credentials incomplete".to_string());
        let refresh_token = self.auth.refresh_token.as_deref().ok_or_else(missing)?;
        let app_key = self.auth.app_key.as_deref().ok_or_else(missing)?;
        let app_secret = self.auth.app_secret.as_deref().ok_or_else(missing)?;

        debug!(token_url = %self.token_url, "exchanging refresh token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .map_err(|e| {
                StoreError::CredentialUnavailable(format!("token refresh request failed: {}", e))
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::CredentialUnavailable(format!(
                "token endpoint returned {}",
                status
            )));
        }
        let body: TokenResponse = response.json().map_err(|e| {
            StoreError::CredentialUnavailable(format!("invalid token response: {}", e))
        })?;
        Ok(Credential {
            access_token: body.access_token,
            obtained_at: Utc::now(),
        })
    }

    /// Best effort: a credential that cannot be cached still works for this
    /// process, so failures only warn.
    fn persist_credential(&self, cred: &Credential) {
        let Some(path) = self.token_cache.as_deref() else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let mut temp = NamedTempFile::new_in(dir)?;
            let bytes = serde_json::to_vec_pretty(cred)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            temp.write_all(&bytes)?;
            temp.flush()?;
            temp.persist(path).map_err(|e| e.error)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), "failed to persist refreshed credential: {}", e);
        }
    }
}

fn load_cached_credential(path: &std::path::Path) -> Option<Credential> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(cred) => {
            debug!(path = %path.display(), "loaded cached remote credential");
            Some(cred)
        }
        Err(e) => {
            warn!(path = %path.display(), "ignoring unreadable credential cache: {}", e);
            None
        }
    }
}
