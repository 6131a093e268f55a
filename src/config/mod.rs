mod file_config;

pub use file_config::{FileConfig, IngestConfig};

use crate::ingest::WriterOptions;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub queue_capacity: usize,
    pub store_raw_json: bool,
    pub store_normalized: bool,
    pub debug: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("getstats.db"),
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            queue_capacity: 1024,
            store_raw_json: false,
            store_normalized: true,
            debug: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub debug: bool,

    pub queue_capacity: usize,
    pub writer: WriterOptions,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.db_path.clone());

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        // A relative file name has an empty parent, meaning the working directory
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let debug = file.debug.unwrap_or(cli.debug);

        let ingest = file.ingest.unwrap_or_default();
        let queue_capacity = ingest.queue_capacity.unwrap_or(cli.queue_capacity);
        if queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        let writer = WriterOptions {
            store_raw_json: ingest.store_raw_json.unwrap_or(cli.store_raw_json),
            store_normalized: ingest.store_normalized.unwrap_or(cli.store_normalized),
        };
        if !writer.store_raw_json && !writer.store_normalized {
            bail!("At least one of store_raw_json and store_normalized must be enabled");
        }

        Ok(AppConfig {
            db_path,
            host,
            port,
            metrics_port,
            logging_level,
            debug,
            queue_capacity,
            writer,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_in(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: dir.path().join("getstats.db"),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("body"),
            Some(RequestsLoggingLevel::Body)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: temp_dir.path().join("stats.db"),
            host: "127.0.0.1".to_string(),
            port: 8081,
            metrics_port: 0,
            logging_level: RequestsLoggingLevel::Headers,
            queue_capacity: 32,
            store_raw_json: true,
            store_normalized: true,
            debug: true,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("stats.db"));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8081);
        assert_eq!(config.metrics_port, 0);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.queue_capacity, 32);
        assert!(config.writer.store_raw_json);
        assert!(config.writer.store_normalized);
        assert!(config.debug);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: PathBuf::from("/should/be/overridden.db"),
            ..Default::default()
        };
        let file = FileConfig {
            db_path: Some(temp_dir.path().join("file.db").to_string_lossy().into_owned()),
            port: Some(9000),
            logging_level: Some("none".to_string()),
            ingest: Some(IngestConfig {
                queue_capacity: Some(4),
                store_raw_json: Some(true),
                store_normalized: Some(false),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("file.db"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::None);
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(
            config.writer,
            WriterOptions {
                store_raw_json: true,
                store_normalized: false,
            }
        );
    }

    #[test]
    fn test_resolve_invalid_logging_level_falls_back_to_cli() {
        let temp_dir = TempDir::new().unwrap();
        let file = FileConfig {
            logging_level: Some("loud".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_in(&temp_dir), Some(file)).unwrap();
        assert_eq!(config.logging_level, RequestsLoggingLevel::Path);
    }

    #[test]
    fn test_resolve_relative_db_path() {
        let cli = CliConfig::default();
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("getstats.db"));
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig {
            db_path: PathBuf::from("/nonexistent/path/getstats.db"),
            ..Default::default()
        };

        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database directory does not exist"));
    }

    #[test]
    fn test_resolve_db_path_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };

        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("is a directory"));
    }

    #[test]
    fn test_resolve_zero_queue_capacity_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            queue_capacity: 0,
            ..cli_in(&temp_dir)
        };

        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_all_retention_disabled_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            store_raw_json: false,
            store_normalized: false,
            ..cli_in(&temp_dir)
        };

        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_server_config() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            metrics_port: 0,
            ..cli_in(&temp_dir)
        };

        let server = AppConfig::resolve(&cli, None).unwrap().server_config();
        assert_eq!(server.listen_addr(), "127.0.0.1:8000");
        assert_eq!(server.metrics_addr(), None);
    }
}
