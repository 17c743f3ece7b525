//! Configuration for hostprep
//!
//! Everything that differs between script revisions (package lists, URLs,
//! release series) lives here instead of in the tasks.
//!
//! # Resolution
//!
//! 1. `--config <path>` / `HOSTPREP_CONFIG`
//! 2. `HOSTPREP_CONFIG_DIR/config.toml`
//! 3. `~/.config/hostprep/config.toml`
//!
//! A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "HOSTPREP_CONFIG_DIR";

/// Name of the config file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the hostprep config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("hostprep"))
}

/// Config file to read: the explicit path if given, else the default location
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join(CONFIG_FILE)),
    }
}

/// Expand `~` and environment variables in a path
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// Values that load but can't be used
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("provision.wget_tries must be at least 1")]
    WgetTries,

    #[error("provision.swap_size_gb must be at least 1")]
    SwapSize,

    #[error("provision.timezone must not be empty")]
    Timezone,

    #[error("provision.{field} must not be empty")]
    EmptyUrl { field: &'static str },
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub provision: ProvisionConfig,
    /// Directory holding `rc-local.service` and `nginx.conf.example`
    pub payload_dir: Option<String>,
}

/// How to reach the host; every field can be overridden on the command line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity: Option<String>,
    /// How long the control master stays up after the last command
    pub control_persist: String,
    /// Passed as `StrictHostKeyChecking`
    pub strict_host_key_checking: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            port: None,
            identity: None,
            control_persist: "10m".to_string(),
            strict_host_key_checking: "accept-new".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Identity file with `~` expanded
    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity.as_deref().map(expand)
    }
}

/// Data the provisioning tasks consume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// `wget --tries` for every download
    pub wget_tries: u32,
    /// Zone under /usr/share/zoneinfo copied to /etc/localtime
    pub timezone: String,
    /// Cloned into the login user's home when ~/.tmux.conf is missing
    pub dotfiles_repo: String,
    pub baseline_packages: Vec<String>,
    /// Whether the default sequence starts by disabling IPv6
    pub disable_ipv6: bool,
    pub swap_size_gb: u32,
    /// Node.js release line under nodejs.org/dist/
    pub node_channel: String,
    pub go_url: String,
    pub python_url: String,
    /// Base URL of prebuilt `<dist>/<release>/<package>/latest.deb` files
    pub latest_packages_base: String,
    pub mongodb_series: String,
    pub mariadb_series: String,
    /// Root password preseeded for mysql and mariadb
    pub database_root_password: String,
    /// The package index counts as fresh for this long
    pub apt_index_max_age_minutes: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            wget_tries: 3,
            timezone: "UTC".to_string(),
            dotfiles_repo: "https://github.com/ichuan/dotfiles.git".to_string(),
            baseline_packages: [
                "git",
                "unzip",
                "curl",
                "wget",
                "tar",
                "sudo",
                "zip",
                "sqlite3",
                "tmux",
                "ntp",
                "build-essential",
                "gettext",
                "libcap2-bin",
                "ack-grep",
                "htop",
                "jq",
                "python",
                "dirmngr",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            disable_ipv6: true,
            swap_size_gb: 1,
            node_channel: "latest-carbon".to_string(),
            go_url: "https://dl.google.com/go/go1.11.5.linux-amd64.tar.gz".to_string(),
            python_url: "https://www.python.org/ftp/python/3.7.3/Python-3.7.3.tgz".to_string(),
            latest_packages_base: "https://raw.githubusercontent.com/ichuan/packages/master"
                .to_string(),
            mongodb_series: "4.0".to_string(),
            mariadb_series: "10.2".to_string(),
            database_root_password: "root".to_string(),
            apt_index_max_age_minutes: 60,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Check values that parse but can't drive a run
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let p = &self.provision;
        if p.wget_tries == 0 {
            return Err(ConfigError::WgetTries);
        }
        if p.swap_size_gb == 0 {
            return Err(ConfigError::SwapSize);
        }
        if p.timezone.trim().is_empty() {
            return Err(ConfigError::Timezone);
        }
        for (field, value) in [
            ("go_url", &p.go_url),
            ("python_url", &p.python_url),
            ("dotfiles_repo", &p.dotfiles_repo),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyUrl { field });
            }
        }
        Ok(())
    }

    /// Directory of files uploaded to the host
    pub fn payload_dir(&self) -> PathBuf {
        self.payload_dir
            .as_deref()
            .map_or_else(|| PathBuf::from("payload"), expand)
    }
}

// ============================================================================
// Tests
// ============================================================================
