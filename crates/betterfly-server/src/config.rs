//! Loads the four JSON config files (`spec.md` §6 External interfaces).
//! The server binary takes no CLI arguments; everything comes from the
//! `config/` directory next to the binary (overridable with
//! `BETTERFLY_CONFIG_DIR`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use betterfly_db::DbConfig;
use betterfly_push::PushConfig;
use betterfly_storage::StorageConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub ip: String,
    pub port: u16,
    /// 64 hex chars (32 bytes) enabling the ChaCha20-Poly1305 frame cipher.
    /// Omitted or absent means frames travel as plain JSON, matching the
    /// original deployment's default.
    #[serde(default)]
    pub cipher_key_hex: Option<String>,
}

pub struct ServerConfig {
    pub listen: ListenConfig,
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub push: PushConfig,
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn load(config_dir: &Path) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        listen: load_json(&config_dir.join("config.json"))?,
        db: load_json(&config_dir.join("database_config.json"))?,
        storage: load_json(&config_dir.join("cos_config.json"))?,
        push: load_json(&config_dir.join("apns_config.json"))?,
    })
}

pub fn config_dir() -> PathBuf {
    std::env::var_os("BETTERFLY_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}
