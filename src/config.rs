// config.rs

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

fn default_refresh_secs() -> u64 {
    60
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

fn config_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", "RustyLists") {
        let dir = dirs.config_dir().to_path_buf();
        create_dir_all(&dir).ok();
        return dir;
    }
    PathBuf::from(".")
}

pub fn config_path() -> PathBuf {
    config_dir().join("server.json")
}

pub fn log_path() -> PathBuf {
    config_dir().join("rustylists.log")
}

pub fn load_from(path: &Path) -> Option<ServerConfig> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).ok()
}

pub fn save_to(path: &Path, cfg: &ServerConfig) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("Open server config failed: {}", e))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, cfg)
        .map_err(|e| format!("Write server config failed: {}", e))
}

/// Resolution order: `RUSTYLISTS_URL` env override, then the config file,
/// then the localhost default.
pub fn resolve() -> ServerConfig {
    let mut cfg = load_from(&config_path()).unwrap_or_default();
    if let Ok(url) = std::env::var("RUSTYLISTS_URL") {
        if !url.trim().is_empty() {
            cfg.base_url = url.trim().to_string();
        }
    }
    cfg
}
