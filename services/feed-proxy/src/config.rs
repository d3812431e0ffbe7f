//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file is
//! optional unless named explicitly with `--config` or `CONFIG_PATH`.
//! The Instagram token is loaded from CLIENT_TOKEN or client_token_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use instagram_auth::{
    DEFAULT_REFRESH_INTERVAL_DAYS, DEFAULT_TOKEN_PATH, GRAPH_API_BASE, MAX_REFRESH_INTERVAL_DAYS,
};
use instagram_graph::DEFAULT_POST_LIMIT;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_PATH: &str = "instagram-feed-proxy.toml";

/// Upper bound accepted by the Graph API for `limit`
const MAX_POST_LIMIT: u32 = 100;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub instagram: InstagramConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Externally advertised URL; defaults to `http://localhost:{port}`
    pub base_url: Option<String>,
    pub max_connections: usize,
    /// Origins allowed by CORS. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5001,
            base_url: None,
            max_connections: 1000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Graph API and token settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub graph_url: String,
    /// Where the renewed token is persisted
    pub token_path: PathBuf,
    /// Fallback token used when `token_path` holds none
    #[serde(skip)]
    pub client_token: Option<Secret<String>>,
    /// Path to a file containing the token (alternative to CLIENT_TOKEN env var)
    pub client_token_file: Option<PathBuf>,
    pub refresh_interval_days: u64,
    pub post_limit: u32,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            graph_url: GRAPH_API_BASE.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            client_token: None,
            client_token_file: None,
            refresh_interval_days: DEFAULT_REFRESH_INTERVAL_DAYS,
            post_limit: DEFAULT_POST_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file that must exist, then overlay
    /// environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, |key| std::env::var(key).ok())
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents, |key| std::env::var(key).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::from_toml("", |key| std::env::var(key).ok())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse `contents`, overlay variables from `env`, then validate.
    ///
    /// Token resolution order:
    /// 1. CLIENT_TOKEN env var
    /// 2. client_token_file path from config
    fn from_toml(contents: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Some(days) = env("IG_REFRESH_INTERVAL_DAYS") {
            config.instagram.refresh_interval_days =
                days.trim().parse().map_err(|e| ConfigError::Env {
                    var: "IG_REFRESH_INTERVAL_DAYS",
                    reason: format!("{e}"),
                    value: days.clone(),
                })?;
        }
        if let Some(port) = env("PORT") {
            config.server.port = port.trim().parse().map_err(|e| ConfigError::Env {
                var: "PORT",
                reason: format!("{e}"),
                value: port.clone(),
            })?;
        }
        if let Some(base_url) = env("BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.server.base_url = Some(base_url.trim().to_string());
        }

        if let Some(token) = env("CLIENT_TOKEN").as_deref().and_then(Secret::non_empty) {
            config.instagram.client_token = Some(token);
        } else if let Some(ref token_file) = config.instagram.client_token_file {
            let token =
                std::fs::read_to_string(token_file).map_err(|source| ConfigError::TokenFile {
                    path: token_file.clone(),
                    source,
                })?;
            config.instagram.client_token = Secret::non_empty(&token);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.instagram.graph_url.starts_with("http://")
            && !self.instagram.graph_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "graph_url must start with http:// or https://, got: {}",
                self.instagram.graph_url
            )));
        }

        if !(1..=MAX_REFRESH_INTERVAL_DAYS).contains(&self.instagram.refresh_interval_days) {
            return Err(ConfigError::Invalid(format!(
                "refresh_interval_days must be between 1 and {MAX_REFRESH_INTERVAL_DAYS}, got: {}",
                self.instagram.refresh_interval_days
            )));
        }

        if self.instagram.post_limit == 0 || self.instagram.post_limit > MAX_POST_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "post_limit must be between 1 and {MAX_POST_LIMIT}, got: {}",
                self.instagram.post_limit
            )));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Invalid("port must be greater than 0".into()));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Advertised base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.server.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    /// Config file named by the CLI arg or CONFIG_PATH env var, if any.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        std::env::var("CONFIG_PATH").ok().map(PathBuf::from)
    }
}
