use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // inbound WS frame cap
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_POLL_BATCH: usize = 10;
pub const DEFAULT_CLIENT_BUFFER: usize = 64;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Top-level config (migii.toml + MIGII_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigiiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer. Empty means "any origin".
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Whether the store exposes a native change stream. When false the
    /// change source polls instead.
    #[serde(default)]
    pub change_streams: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            change_streams: false,
        }
    }
}

/// Limits applied to documents attached at worker registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_max_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl UploadConfig {
    pub fn allows_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime.trim()))
    }
}

/// Fixed-window rate limit applied per client address on `/api/*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
    /// Key clients on the first `X-Forwarded-For` hop instead of the peer
    /// address. Only enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_window_secs(),
            max_requests: default_rate_max_requests(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_watched_collections")]
    pub watched_collections: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Records fetched per collection on each poll tick.
    #[serde(default = "default_poll_batch")]
    pub poll_batch: usize,
    /// Per-connection outbound buffer; a full buffer drops the event.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            watched_collections: default_watched_collections(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_batch: default_poll_batch(),
            client_buffer: default_client_buffer(),
        }
    }
}

/// Settings for the reconnecting realtime client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_url")]
    pub url: String,
    #[serde(default = "default_reconnect_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_client_url(),
            base_delay_ms: default_reconnect_base_ms(),
            max_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.migii/migii.db", home)
}
fn default_upload_max_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "application/pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_rate_window_secs() -> u64 {
    15 * 60
}
fn default_rate_max_requests() -> u32 {
    100
}
fn default_watched_collections() -> Vec<String> {
    vec!["workers".to_string(), "jobs".to_string()]
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_poll_batch() -> usize {
    DEFAULT_POLL_BATCH
}
fn default_client_buffer() -> usize {
    DEFAULT_CLIENT_BUFFER
}
fn default_client_url() -> String {
    format!("ws://127.0.0.1:{}/", DEFAULT_PORT)
}
fn default_reconnect_base_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_MS
}
fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

impl MigiiConfig {
    /// Load config from a TOML file with MIGII_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.migii/migii.toml
    ///
    /// Nested keys use a double underscore: `MIGII_SERVER__PORT=8080`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::from(Serialized::defaults(MigiiConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MIGII_").split("__"))
            .extract()
            .map_err(|e| crate::error::MigiiError::Config(e.to_string()))
    }

    /// `bind:port` string for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.migii/migii.toml", home)
}
