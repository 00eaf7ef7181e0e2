// Copyright 2023 Remi Bernotavicius

use serde::Deserialize;
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Defaults to `data.sqlite` in the user data directory.
    pub path: Option<PathBuf>,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    /// Prefix every route is mounted under. Empty mounts at the root.
    pub base_path: String,
    pub max_page_size: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            base_path: "/cooking/ver3".to_string(),
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level
            .parse()
            .map_err(|_| format!("log.level {:?} is not a log level", self.level).into())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).map_err(|e| format!("failed to parse config file: {e}"))?;

    if config.database.pool_size == 0 {
        return Err("database.pool_size must be > 0".into());
    }

    if config.server.max_page_size < 1 {
        return Err("server.max_page_size must be >= 1".into());
    }

    let base_path = &config.server.base_path;
    if !base_path.is_empty() && (!base_path.starts_with('/') || base_path.ends_with('/')) {
        return Err(format!(
            "server.base_path {base_path:?} must start with '/' and not end with '/'"
        )
        .into());
    }

    config.log.level_filter()?;

    Ok(config)
}

#[test]
fn empty_config_uses_defaults() {
    let config = parse_config("").unwrap();
    assert_eq!(config.database.path, None);
    assert_eq!(config.database.pool_size, 8);
    assert_eq!(config.server.bind, "127.0.0.1:8000");
    assert_eq!(config.server.base_path, "/cooking/ver3");
    assert_eq!(config.server.max_page_size, 100);
    assert_eq!(config.log.level_filter().unwrap(), log::LevelFilter::Info);
}

#[test]
fn partial_config_keeps_other_defaults() {
    let config = parse_config(
        r#"
        [database]
        path = "/tmp/dishes.sqlite"

        [server]
        base_path = ""

        [log]
        level = "debug"
        "#,
    )
    .unwrap();
    assert_eq!(
        config.database.path,
        Some(PathBuf::from("/tmp/dishes.sqlite"))
    );
    assert_eq!(config.database.busy_timeout_ms, 5_000);
    assert_eq!(config.server.base_path, "");
    assert_eq!(config.server.bind, "127.0.0.1:8000");
    assert_eq!(config.log.level_filter().unwrap(), log::LevelFilter::Debug);
}

#[test]
fn invalid_config_is_rejected() {
    for bad in [
        "[database]\npool_size = 0",
        "[server]\nmax_page_size = 0",
        "[server]\nbase_path = \"cooking\"",
        "[server]\nbase_path = \"/cooking/\"",
        "[log]\nlevel = \"loud\"",
        "[server]\nport = 80",
    ] {
        assert!(parse_config(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn load_config_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dish-manager.toml");
    std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();
    assert_eq!(load_config(&path).unwrap().server.bind, "0.0.0.0:9000");
    assert!(load_config(&dir.path().join("missing.toml")).is_err());
}
