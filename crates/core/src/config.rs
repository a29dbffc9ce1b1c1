use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogbookError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub ingest_http_addr: String,
    pub query_http_addr: String,
    pub query_tcp_addr: String,
    pub uds_path: PathBuf,
    pub ingest_max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let xdg_runtime = env::var("XDG_RUNTIME_DIR").ok();
        let data_home = env::var("XDG_DATA_HOME").ok();

        let data_root = data_home
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home).join(".local/share"));

        let uds_path = xdg_runtime
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("logbook"))
            .join("logbook.sock");

        Self {
            db_path: data_root.join("logbook/logbook.duckdb"),
            ingest_http_addr: "127.0.0.1:5080".to_string(),
            query_http_addr: "127.0.0.1:5081".to_string(),
            query_tcp_addr: "127.0.0.1:5082".to_string(),
            uds_path,
            ingest_max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults, then the config file, then `LOGBOOK_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    ingest_http_addr: Option<String>,
    query_http_addr: Option<String>,
    query_tcp_addr: Option<String>,
    uds_path: Option<PathBuf>,
    ingest_max_body_bytes: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("LOGBOOK_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("logbook/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| LogbookError::Config(format!("failed reading {}: {e}", path.display())))?;
    parse_overrides(&raw)
        .map(Some)
        .map_err(|e| LogbookError::Config(format!("failed parsing {}: {e}", path.display())))
}

fn parse_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        db_path: env::var("LOGBOOK_DB_PATH").ok().map(PathBuf::from),
        ingest_http_addr: env::var("LOGBOOK_INGEST_HTTP_ADDR").ok(),
        query_http_addr: env::var("LOGBOOK_QUERY_HTTP_ADDR").ok(),
        query_tcp_addr: env::var("LOGBOOK_QUERY_TCP_ADDR").ok(),
        uds_path: env::var("LOGBOOK_QUERY_UDS_PATH").ok().map(PathBuf::from),
        ingest_max_body_bytes: env::var("LOGBOOK_INGEST_MAX_BODY_BYTES").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.ingest_http_addr {
        cfg.ingest_http_addr = v;
    }
    if let Some(v) = overrides.query_http_addr {
        cfg.query_http_addr = v;
    }
    if let Some(v) = overrides.query_tcp_addr {
        cfg.query_tcp_addr = v;
    }
    if let Some(v) = overrides.uds_path {
        cfg.uds_path = v;
    }
    if let Some(v) = overrides.ingest_max_body_bytes {
        cfg.ingest_max_body_bytes = parse_byte_size(&v).map_err(|e| {
            LogbookError::Config(format!(
                "bad ingest_max_body_bytes in {source}: {e} (value={v})"
            ))
        })?;
    }
    Ok(())
}

/// Plain byte counts or `k`/`m` suffixed sizes (`512k`, `16m`).
fn parse_byte_size(raw: &str) -> Result<usize> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = trimmed.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = trimmed.strip_suffix('k') {
        (n, 1024)
    } else {
        (trimmed.as_str(), 1)
    };
    let value = digits
        .trim()
        .parse::<usize>()
        .map_err(|e| LogbookError::Config(format!("not a byte size: {e}")))?;
    if value == 0 {
        return Err(LogbookError::Config("byte size must be positive".to_string()));
    }
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_expected_ports() {
        let cfg = Config::default();
        assert_eq!(cfg.ingest_http_addr, "127.0.0.1:5080");
        assert_eq!(cfg.query_http_addr, "127.0.0.1:5081");
        assert_eq!(cfg.query_tcp_addr, "127.0.0.1:5082");
        assert!(cfg.db_path.ends_with("logbook/logbook.duckdb"));
    }

    #[test]
    fn parse_byte_size_accepts_suffixes() {
        assert_eq!(parse_byte_size("2048").unwrap(), 2048);
        assert_eq!(parse_byte_size("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_byte_size("16M").unwrap(), 16 * 1024 * 1024);
        assert!(parse_byte_size("0").is_err());
        assert!(parse_byte_size("lots").is_err());
    }

    #[test]
    fn apply_file_overrides_updates_fields() {
        let mut cfg = Config::default();
        let file = parse_overrides(
            r#"
            db_path = "/var/lib/logbook/logs.duckdb"
            query_http_addr = "0.0.0.0:9000"
            ingest_max_body_bytes = "1m"
            "#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.db_path, PathBuf::from("/var/lib/logbook/logs.duckdb"));
        assert_eq!(cfg.query_http_addr, "0.0.0.0:9000");
        assert_eq!(cfg.ingest_max_body_bytes, 1024 * 1024);
        assert_eq!(cfg.ingest_http_addr, "127.0.0.1:5080");
    }

    #[test]
    fn bad_override_names_its_source() {
        let mut cfg = Config::default();
        let overrides = ConfigOverrides {
            ingest_max_body_bytes: Some("huge".to_string()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, overrides, "environment").unwrap_err();
        assert!(err.to_string().contains("environment"));
    }
}
