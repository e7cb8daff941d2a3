use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fetcher::QueryCredentials;

/// Environment variable consulted when `email.password` is not set
pub const SMTP_PASSWORD_ENV: &str = "MS_WATCH_SMTP_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paper: PaperConfig,
    pub fetch: FetchConfig,
    pub state_file: PathBuf,
    /// Where raw pages of failed parses are dumped, if anywhere
    pub debug_dir: Option<PathBuf>,
    pub interval_seconds: u64,
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paper: PaperConfig::default(),
            fetch: FetchConfig::default(),
            state_file: PathBuf::from("ms-watch-state.json"),
            debug_dir: None,
            interval_seconds: 1800,
            email: EmailConfig::default(),
        }
    }
}

/// The tracked submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Short name used in notification subjects
    pub label: String,
    pub manuscript_number: String,
    pub last_name: String,
    pub first_name: String,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            label: "manuscript".to_string(),
            manuscript_number: String::new(),
            last_name: String::new(),
            first_name: String::new(),
        }
    }
}

impl PaperConfig {
    pub fn credentials(&self) -> QueryCredentials {
        QueryCredentials {
            manuscript_number: self.manuscript_number.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
        }
    }
}

/// Status page request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: "https://webapps.elsevier.cn/st-wechat/manuscript-query".to_string(),
            timeout_secs: 30,
            user_agent: concat!("ms-watch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One address or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl Recipients {
    pub fn to_vec(&self) -> Vec<String> {
        let all = match self {
            Recipients::One(address) => vec![address.clone()],
            Recipients::Many(addresses) => addresses.clone(),
        };
        all.into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// SMTP notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Upgrade a plain connection with STARTTLS instead of implicit TLS
    pub starttls: bool,
    pub username: String,
    pub password: Option<String>,
    pub from: Option<String>,
    pub to: Recipients,
    pub subject_prefix: String,
    pub send_on_first_run: bool,
    pub send_on_change: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 465,
            starttls: false,
            username: String::new(),
            password: None,
            from: None,
            to: Recipients::default(),
            subject_prefix: "[Elsevier]".to_string(),
            send_on_first_run: true,
            send_on_change: true,
        }
    }
}

impl EmailConfig {
    /// Sender address, defaulting to the SMTP username
    pub fn from_address(&self) -> &str {
        match self.from.as_deref() {
            Some(from) if !from.trim().is_empty() => from.trim(),
            _ => self.username.trim(),
        }
    }

    /// Password from the config file, else from [`SMTP_PASSWORD_ENV`]
    pub fn resolve_password(&self) -> Option<String> {
        self.password
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| std::env::var(SMTP_PASSWORD_ENV).ok().filter(|p| !p.is_empty()))
    }

    pub fn subject_prefix(&self) -> &str {
        match self.subject_prefix.trim() {
            "" => "[Elsevier]",
            prefix => prefix,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Check that the paper identity is present and that an enabled email
    /// section can actually send
    pub fn validate(&self) -> Result<()> {
        let creds = self.paper.credentials();
        if creds.manuscript_number.is_empty() {
            anyhow::bail!("paper.manuscript_number is required");
        }
        if creds.last_name.is_empty() || creds.first_name.is_empty() {
            anyhow::bail!("paper.last_name and paper.first_name are required");
        }
        if self.fetch.url.trim().is_empty() {
            anyhow::bail!("fetch.url must not be empty");
        }
        if self.interval_seconds == 0 {
            anyhow::bail!("interval_seconds must be positive");
        }

        if self.email.enabled {
            if self.email.host.trim().is_empty() {
                anyhow::bail!("email.host is required when email is enabled");
            }
            if self.email.username.trim().is_empty() {
                anyhow::bail!("email.username is required when email is enabled");
            }
            if self.email.resolve_password().is_none() {
                anyhow::bail!(
                    "email.password is required when email is enabled (or set {})",
                    SMTP_PASSWORD_ENV
                );
            }
            if self.email.to.to_vec().is_empty() {
                anyhow::bail!("email.to needs at least one recipient");
            }
        }

        Ok(())
    }
}
