//! Store configuration
//!
//! Everything is builder-style with working defaults; the only required
//! input is where the data directory lives. Remote backup stays disabled
//! until a [`RemoteConfig`] with at least one credential is attached.

use crate::core::{DocumentShape, Result, StoreError};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PRIMARY_FILE: &str = "state.json";
pub const DEFAULT_SNAPSHOTS_DIR: &str = "backups";
pub const DEFAULT_LOCAL_KEEP: usize = 10;
pub const DEFAULT_REMOTE_KEEP: usize = 5;

// ============================================================================
// Destination
// ============================================================================

/// Where a save or backup is directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Local,
    Remote,
    Both,
}

impl Destination {
    pub fn includes_local(self) -> bool {
        matches!(self, Destination::Local | Destination::Both)
    }

    pub fn includes_remote(self) -> bool {
        matches!(self, Destination::Remote | Destination::Both)
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Destination::Local),
            "remote" => Ok(Destination::Remote),
            "both" => Ok(Destination::Both),
            other => Err(format!(
                "unknown destination '{}' (expected local, remote or both)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Destination::Local => "local",
            Destination::Remote => "remote",
            Destination::Both => "both",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Store Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the primary file and the snapshots directory
    pub data_dir: PathBuf,

    /// File name of the primary document inside `data_dir`
    pub primary_file: String,

    /// Directory name for local snapshots inside `data_dir`
    pub snapshots_dir: String,

    /// How many local snapshots to retain
    pub local_keep: usize,

    /// How many remote snapshots to retain
    pub remote_keep: usize,

    /// Default destination for `save` and `backup`
    pub destination: Destination,

    /// Expected top-level collections, backfilled when missing
    pub shape: DocumentShape,

    /// Array collections whose object entries must carry an `"id"`
    pub id_collections: Vec<String>,

    /// Remote backup endpoint; `None` disables remote entirely
    pub remote: Option<RemoteConfig>,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            primary_file: DEFAULT_PRIMARY_FILE.to_string(),
            snapshots_dir: DEFAULT_SNAPSHOTS_DIR.to_string(),
            local_keep: DEFAULT_LOCAL_KEEP,
            remote_keep: DEFAULT_REMOTE_KEEP,
            destination: Destination::Local,
            shape: DocumentShape::default(),
            id_collections: vec!["players".to_string()],
            remote: None,
        }
    }

    pub fn primary_file(mut self, name: &str) -> Self {
        self.primary_file = name.to_string();
        self
    }

    pub fn local_keep(mut self, keep: usize) -> Self {
        self.local_keep = keep;
        self
    }

    pub fn remote_keep(mut self, keep: usize) -> Self {
        self.remote_keep = keep;
        self
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn shape(mut self, shape: DocumentShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn id_collections(mut self, collections: Vec<String>) -> Self {
        self.id_collections = collections;
        self
    }

    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn primary_path(&self) -> PathBuf {
        self.data_dir.join(&self.primary_file)
    }

    pub fn snapshots_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshots_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_file.is_empty() {
            return Err(StoreError::Config("primary_file cannot be empty".to_string()));
        }
        if self.local_keep == 0 {
            return Err(StoreError::Config("local_keep must be > 0".to_string()));
        }
        if self.remote_keep == 0 {
            return Err(StoreError::Config("remote_keep must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

// ============================================================================
// Remote Configuration
// ============================================================================

/// Credentials for the remote storage service.
///
/// The refresh trio (refresh token, app key, app secret) enables automatic
/// access-token renewal. Without it the broker serves the static access
/// token until the service rejects it.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
}

impl AuthConfig {
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.app_key.is_some() && self.app_secret.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() || self.can_refresh()
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the blob storage API
    pub base_url: String,

    /// OAuth2 token endpoint used for refresh exchanges
    pub token_url: String,

    /// Namespace prefix holding all snapshot blobs
    pub prefix: String,

    /// Bound on every remote request
    pub timeout: Duration,

    /// Age after which a cached access token is refreshed proactively
    pub staleness_window: Duration,

    /// Where refreshed credentials are persisted for reuse across
    /// process restarts. Defaults to a file inside the data directory.
    pub token_cache: Option<PathBuf>,

    pub auth: AuthConfig,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let token_url = format!("{}/oauth2/token", base_url.trim_end_matches('/'));
        Self {
            base_url,
            token_url,
            prefix: "/backups".to_string(),
            timeout: Duration::from_secs(30),
            staleness_window: Duration::from_secs(3 * 3600),
            token_cache: None,
            auth: AuthConfig::default(),
        }
    }

    pub fn token_url(mut self, url: &str) -> Self {
        self.token_url = url.to_string();
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    pub fn token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache = Some(path.into());
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn access_token(mut self, token: &str) -> Self {
        self.auth.access_token = Some(token.to_string());
        self
    }

    pub fn refresh_credentials(mut self, refresh_token: &str, app_key: &str, app_secret: &str) -> Self {
        self.auth.refresh_token = Some(refresh_token.to_string());
        self.auth.app_key = Some(app_key.to_string());
        self.auth.app_secret = Some(app_secret.to_string());
        self
    }

    pub fn enabled(&self) -> bool {
        self.auth.is_configured()
    }

    /// Builds a remote configuration from the environment (and `.env`,
    /// loaded via dotenvy). Returns `None` when `REMOTE_BASE_URL` is unset
    /// or no credential at all is present.
    ///
    /// Recognized variables: `REMOTE_BASE_URL`, `REMOTE_TOKEN_URL`,
    /// `REMOTE_ACCESS_TOKEN`, `REMOTE_REFRESH_TOKEN`, `REMOTE_APP_KEY`,
    /// `REMOTE_APP_SECRET`.
    pub fn from_env() -> Option<Self> {
        dotenvy::dotenv().ok();

        let base_url = non_empty_env("REMOTE_BASE_URL")?;
        let mut config = Self::new(base_url);
        if let Some(token_url) = non_empty_env("REMOTE_TOKEN_URL") {
            config.token_url = token_url;
        }
        config.auth = AuthConfig {
            access_token: non_empty_env("REMOTE_ACCESS_TOKEN"),
            refresh_token: non_empty_env("REMOTE_REFRESH_TOKEN"),
            app_key: non_empty_env("REMOTE_APP_KEY"),
            app_secret: non_empty_env("REMOTE_APP_SECRET"),
        };
        if !config.enabled() {
            return None;
        }
        Some(config)
    }

    pub fn resolved_token_cache(&self, data_dir: &Path) -> PathBuf {
        self.token_cache
            .clone()
            .unwrap_or_else(|| data_dir.join(".remote_token.json"))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
