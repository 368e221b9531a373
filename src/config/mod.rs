//! # Configuration Management Module
//!
//! Loads and writes the proxy's TOML configuration.
//!
//! ## Configuration Structure
//!
//! - [`ProxyConfig`] - Where the PIM lives and where the proxy listens
//! - [`AuthConfig`] - PIM credentials used to check the client's challenge response
//! - [`LoggingConfig`] - Log level and optional log file
//! - [`DisplayConfig`] - How decoded events are rendered
//!
//! ## Usage
//!
//! ```rust,no_run
//! use upbproxy::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("PIM at {}", config.proxy.pim_addr());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [proxy]
//! pim_host = "192.168.1.50"
//! pim_port = 2101
//! listen_addr = "0.0.0.0"
//! listen_port = 2101
//!
//! [auth]
//! username = "upstart"
//! # password = "set with `upbproxy set-password`"
//!
//! [logging]
//! level = "info"
//! file = "upbproxy.log"
//!
//! [display]
//! format = "text"
//! show_pulses = false
//! ```
//!
//! Every section except `[proxy]` may be omitted and falls back to its defaults.
//! CLI flags on `start` override the file.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::upb::auth::Credentials;

/// Default TCP port of a networked PIM.
pub const DEFAULT_PIM_PORT: u16 = 2101;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub pim_host: String,
    #[serde(default = "default_port")]
    pub pim_port: u16,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_port")]
    pub listen_port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PIM_PORT
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

impl ProxyConfig {
    pub fn pim_addr(&self) -> String {
        format!("{}:{}", self.pim_host, self.pim_port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    /// Only used to verify the client's response; never sent anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub format: DisplayFormat,
    /// Log every pulse-mode line, not only the packets they build.
    #[serde(default)]
    pub show_pulses: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        Config::default().save(path).await
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.proxy.pim_host.trim().is_empty() {
            return Err(anyhow!("proxy.pim_host must not be empty"));
        }
        if self.proxy.pim_port == 0 {
            return Err(anyhow!("proxy.pim_port must be non-zero"));
        }
        if self.auth.password.is_some() && self.auth.username.trim().is_empty() {
            return Err(anyhow!("auth.username is required when auth.password is set"));
        }
        Ok(())
    }

    /// Credentials for response verification, when a password is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        self.auth.password.as_ref().map(|password| Credentials {
            username: self.auth.username.clone(),
            password: password.clone(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            proxy: ProxyConfig {
                pim_host: "192.168.1.50".to_string(),
                pim_port: DEFAULT_PIM_PORT,
                listen_addr: default_listen_addr(),
                listen_port: DEFAULT_PIM_PORT,
            },
            auth: AuthConfig {
                username: "upstart".to_string(),
                password: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("upbproxy.log".to_string()),
            },
            display: DisplayConfig::default(),
        }
    }
}
