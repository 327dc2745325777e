//! Client configuration
//!
//! Config precedence: env vars > config file > defaults. The app secret is
//! loaded from the SWS_APP_SECRET env var or `secret_file`, never stored in
//! the TOML directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;

use crate::service::ServiceKind;

pub const APP_SECRET_ENV: &str = "SWS_APP_SECRET";
pub const CONFIG_PATH_ENV: &str = "SWS_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "sws-client.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub app: AppConfig,
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Application credentials issued by SWS
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub id: String,
    #[serde(skip)]
    pub secret: Secret<String>,
    /// Path to a file containing the app secret (alternative to SWS_APP_SECRET)
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    /// Per-service base URL overrides, keyed by service name
    #[serde(default)]
    pub services: HashMap<ServiceKind, String>,
}

impl EndpointConfig {
    pub fn base_url_for(&self, kind: ServiceKind) -> &str {
        self.services
            .get(&kind)
            .map(String::as_str)
            .unwrap_or(&self.base_url)
    }
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// JSON session file; restored on start and rewritten after each refresh
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl ClientConfig {
    /// Configuration for programmatic use, with default HTTP settings and no
    /// session file.
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            app: AppConfig {
                id: app_id.into(),
                secret: Secret::new(app_secret.into()),
                secret_file: None,
            },
            endpoints: EndpointConfig {
                base_url: base_url.into(),
                services: HashMap::new(),
            },
            http: HttpConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// App secret resolution order:
    /// 1. SWS_APP_SECRET env var
    /// 2. secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;

        if let Ok(secret) = std::env::var(APP_SECRET_ENV) {
            config.app.secret = Secret::new(secret);
        } else if let Some(ref secret_file) = config.app.secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.app.secret = Secret::new(secret.trim().to_owned());
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that deserialization cannot express.
    pub fn validate(&self) -> common::Result<()> {
        if self.app.id.is_empty() {
            return Err(common::Error::Config("app id must not be empty".into()));
        }
        if self.app.secret.is_empty() {
            return Err(common::Error::Config(format!(
                "app secret missing: set {APP_SECRET_ENV} or [app] secret_file"
            )));
        }

        check_url("base_url", &self.endpoints.base_url)?;
        let mut overrides: Vec<_> = self.endpoints.services.iter().collect();
        overrides.sort_by_key(|(kind, _)| **kind);
        for (kind, url) in overrides {
            check_url(kind.name(), url)?;
        }

        if self.http.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from an explicit path or SWS_CONFIG_PATH.
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}

fn check_url(name: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}
