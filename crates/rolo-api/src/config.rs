//! Runtime configuration, deserialised from `config.toml` plus `ROLO__*`
//! environment overrides by the server binary.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:         String,
  #[serde(default = "default_port")]
  pub port:         u16,
  #[serde(default = "default_store_path")]
  pub store_path:   PathBuf,
  /// Mount point for every route, e.g. `/v1`. Empty mounts at the root.
  #[serde(default)]
  pub path_prefix:  String,
  /// Allowed CORS origins; `*` allows any origin.
  #[serde(default = "default_cors_origins")]
  pub cors_origins: Vec<String>,
  #[serde(default)]
  pub update_mode:  UpdateMode,
  #[serde(default)]
  pub rate_limit:   RateLimitConfig,
  pub auth:         AuthConfig,
}

/// How `PUT /contacts/{id}` treats the fields of its payload.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
  /// Every supplied key is applied, including empty strings and `null`.
  #[default]
  Explicit,
  /// Empty strings and `null` are ignored; fields can never be cleared.
  Truthy,
}

/// Limit applied to `POST /contacts/`.
#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
  /// Calls allowed per window.
  #[serde(default = "default_times")]
  pub times:               u32,
  /// Window length.
  #[serde(default = "default_seconds")]
  pub seconds:             u64,
  /// Redis holding the sliding-window counters. Without it the limiter runs
  /// in process and is not shared between server instances.
  #[serde(default)]
  pub redis_url:           Option<String>,
  #[serde(default = "default_key_prefix")]
  pub key_prefix:          String,
  /// Identify callers by `X-Forwarded-For` / `X-Real-IP` instead of the
  /// socket peer. Only safe behind a proxy that overwrites those headers.
  #[serde(default)]
  pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      times:               default_times(),
      seconds:             default_seconds(),
      redis_url:           None,
      key_prefix:          default_key_prefix(),
      trust_forwarded_for: false,
    }
  }
}

/// Bearer-token settings.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
  /// HMAC secret for HS256 access tokens.
  pub jwt_secret:        String,
  #[serde(default = "default_token_ttl_minutes")]
  pub token_ttl_minutes: i64,
  /// Reject contact requests without a valid bearer token.
  #[serde(default)]
  pub require_auth:      bool,
}

impl ServerConfig {
  /// `path_prefix` with a leading slash and no trailing slash, or `""`.
  pub fn normalized_prefix(&self) -> String {
    let trimmed = self.path_prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
      String::new()
    } else {
      format!("/{trimmed}")
    }
  }
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8000 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/rolo/contacts.db") }

fn default_cors_origins() -> Vec<String> { vec!["*".to_string()] }

fn default_times() -> u32 { 10 }

fn default_seconds() -> u64 { 60 }

fn default_key_prefix() -> String { "rolo-limiter".to_string() }

fn default_token_ttl_minutes() -> i64 { 60 }
