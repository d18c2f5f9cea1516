//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use voxcall_voice::{LlmConfig, SynthesisConfig, TelephonyConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reply generation settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech synthesis settings, including the audio output directory.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Carrier API settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Conversation loop behaviour.
    #[serde(default)]
    pub call: CallConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL (e.g. `https://calls.example.com`).
    ///
    /// Used for audio and webhook URLs handed to the carrier. When unset, the
    /// request's `Host` header is used.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxcall_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Per-turn behaviour of the conversation loop.
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Directive used when neither the session nor the request carries one.
    #[serde(default = "default_directive")]
    pub default_directive: String,

    /// Spoken before hanging up.
    #[serde(default = "default_farewell_line")]
    pub farewell_line: String,

    /// Case-insensitive substring that ends the call.
    #[serde(default = "default_goodbye_token")]
    pub goodbye_token: String,

    /// Seconds the carrier waits for the caller to start speaking.
    #[serde(default = "default_gather_timeout_secs")]
    pub gather_timeout_secs: u32,

    /// Pre-recorded greeting, relative to the audio directory.
    #[serde(default = "default_greeting_file")]
    pub greeting_file: String,

    /// Speak the reply text with the carrier's voice when synthesis fails.
    #[serde(default = "default_true")]
    pub say_on_synthesis_failure: bool,

    /// Upper bound on a transcript write before the turn is answered anyway.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Deadline for everything a speech webhook does before the transcript
    /// write: session lookup, credential reads, completion and synthesis.
    /// The write adds at most `store_timeout_ms` on top.
    #[serde(default = "default_turn_budget_ms")]
    pub turn_budget_ms: u64,
}

impl CallConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn turn_budget(&self) -> Duration {
        Duration::from_millis(self.turn_budget_ms)
    }

    /// Whether `utterance` asks to end the call.
    pub fn is_farewell(&self, utterance: &str) -> bool {
        let token = self.goodbye_token.trim().to_lowercase();
        !token.is_empty() && utterance.to_lowercase().contains(&token)
    }
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// How long a credential read may be served from memory. Zero disables
    /// caching.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl CredentialsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Operator API protection.
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token required on operator routes. Unset leaves them open.
    #[serde(default)]
    pub operator_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "operator_token",
                &self.operator_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AuthConfig {
    /// The configured token, ignoring blank values.
    pub fn token(&self) -> Option<&str> {
        self.operator_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "data/voxcall.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    2_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_directive() -> String {
    "You are a helpful phone assistant. Answer briefly and politely.".to_string()
}

fn default_farewell_line() -> String {
    "Thank you for using us. Goodbye!".to_string()
}

fn default_goodbye_token() -> String {
    "goodbye".to_string()
}

fn default_gather_timeout_secs() -> u32 {
    10
}

fn default_greeting_file() -> String {
    "response.mp3".to_string()
}

fn default_true() -> bool {
    true
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_turn_budget_ms() -> u64 {
    8_000
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_directive: default_directive(),
            farewell_line: default_farewell_line(),
            goodbye_token: default_goodbye_token(),
            gather_timeout_secs: default_gather_timeout_secs(),
            greeting_file: default_greeting_file(),
            say_on_synthesis_failure: true,
            store_timeout_ms: default_store_timeout_ms(),
            turn_budget_ms: default_turn_budget_ms(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXCALL_HOST` overrides `server.host`
/// - `VOXCALL_PORT` overrides `server.port`
/// - `VOXCALL_PUBLIC_URL` overrides `server.public_url`
/// - `VOXCALL_DB_PATH` overrides `database.path`
/// - `VOXCALL_LOG_LEVEL` overrides `logging.level`
/// - `VOXCALL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOXCALL_AUDIO_DIR` overrides `synthesis.audio_dir`
/// - `VOXCALL_OPERATOR_TOKEN` overrides `auth.operator_token`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies `VOXCALL_*` overrides read through `var`.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("VOXCALL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("VOXCALL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = var("VOXCALL_PUBLIC_URL") {
        config.server.public_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    if let Some(db_path) = var("VOXCALL_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("VOXCALL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("VOXCALL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(dir) = var("VOXCALL_AUDIO_DIR") {
        config.synthesis.audio_dir = PathBuf::from(dir);
    }
    if let Some(token) = var("VOXCALL_OPERATOR_TOKEN") {
        config.auth.operator_token = Some(token);
    }
}
