//! Process configuration, read once at startup and immutable afterwards.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};
use url::Url;

use crate::errors::KeeperError;

/// Spoofed identification string handed to the browser; a plain headless
/// UA gets the extension served a degraded page
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_INTERVAL_SECS: u64 = 3600;
const DEFAULT_JITTER_SECS: u64 = 180;

/// Immutable process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Access token injected into the application's client-side storage
    pub token: String,
    /// Identifier of the browser extension under management
    pub extension_id: String,
    /// Public site origin holding the authenticated session
    pub origin_url: Url,
    /// The extension's internal settings/status page
    pub extension_page_url: Url,
    /// Local packed-extension artifact loaded into the browser
    pub crx_path: PathBuf,
    /// Directory holding persisted schedule records
    pub state_dir: PathBuf,
    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,
    pub user_agent: String,
    pub headless: bool,
    pub claim_interval: Duration,
    pub extension_interval: Duration,
    pub jitter: Duration,
}

fn required(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| KeeperError::Config(format!("{} is not set", name)).into())
        .and_then(|v| {
            if v.trim().is_empty() {
                Err(KeeperError::Config(format!("{} is empty", name)).into())
            } else {
                Ok(v)
            }
        })
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|e| KeeperError::Config(format!("{} is not a valid URL: {}", name, e)).into())
}

fn duration_var(name: &str, default_secs: u64) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                KeeperError::Config(format!("{} must be a number of seconds", name)).into()
            }),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

impl Config {
    /// Read configuration from the environment, optionally preloading an
    /// env file first. A named env file that cannot be read is fatal;
    /// the implicit `.env` lookup is best-effort.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    KeeperError::Config(format!(
                        "could not load env file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                debug!("Loaded environment from {}", path.display());
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }

        let token = required("NP_KEY")?;
        let extension_id = required("EXTENSION_ID")?;
        let origin_url = parse_url("EXTENSION_URL", &required("EXTENSION_URL")?)?;

        let extension_page_url = match env::var("EXTENSION_PAGE_URL") {
            Ok(raw) => parse_url("EXTENSION_PAGE_URL", &raw)?,
            Err(_) => parse_url(
                "extension page",
                &format!("chrome-extension://{}/index.html", extension_id),
            )?,
        };

        let crx_path = env::var("EXTENSION_CRX_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(format!("{}.crx", extension_id)));

        let state_dir = env::var("STATE_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nodekeeper")
                .join("state")
        });

        let config = Config {
            token,
            extension_id,
            origin_url,
            extension_page_url,
            crx_path,
            state_dir,
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            headless: true,
            claim_interval: duration_var("CLAIM_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?,
            extension_interval: duration_var(
                "EXTENSION_CHECK_INTERVAL_SECS",
                DEFAULT_INTERVAL_SECS,
            )?,
            jitter: duration_var("SCHEDULE_JITTER_SECS", DEFAULT_JITTER_SECS)?,
        };

        info!("Configuration loaded for extension {}", config.extension_id);
        Ok(config)
    }

    /// Verify external artifacts exist before any session is created.
    /// A missing artifact is a configuration problem and is not retried.
    pub fn validate(&self) -> Result<()> {
        if !self.crx_path.exists() {
            return Err(KeeperError::Config(format!(
                "extension package not found at {}",
                self.crx_path.display()
            ))
            .into());
        }
        Ok(())
    }

    /// Rewards dashboard, relative to the public origin
    pub fn dashboard_url(&self) -> Result<Url> {
        self.origin_url
            .join("dashboard")
            .map_err(|e| KeeperError::Config(format!("bad dashboard URL: {}", e)).into())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
