use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_CONFIG_FILE: &str = "wellbeing.toml";
pub const CONFIG_ENV_VAR: &str = "WELLBEING_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the responses table
    pub db_path: PathBuf,

    /// Hex-encoded SHA-256 digest of the HR password
    pub hr_password_sha256: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wellbeing.db"),
            hr_password_sha256: None,
        }
    }
}

impl Config {
    pub fn set_db_path(&mut self, path: PathBuf) {
        self.db_path = path;
    }

    /// Check a candidate HR password against the configured digest.
    /// Always false when no digest is configured.
    pub fn verify_hr_password(&self, candidate: &str) -> bool {
        match &self.hr_password_sha256 {
            Some(expected) => expected.trim().eq_ignore_ascii_case(&hash_password(candidate)),
            None => false,
        }
    }

    pub fn hr_enabled(&self) -> bool {
        self.hr_password_sha256.is_some()
    }
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Read config from the given file, the `WELLBEING_CONFIG` file, or
/// `wellbeing.toml` in the working directory, in that order.
///
/// Only the implicit default file may be absent.
pub fn get_config(explicit: Option<&Path>) -> Result<Config> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    match named {
        Some(path) => read_config(&path),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.exists() {
                read_config(&path)
            } else {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Ok(Config::default())
            }
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let cfg_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = toml::from_str(&cfg_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(config)
}
