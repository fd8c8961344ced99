use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use lib_common::{ConfigError, Merge, default_config_path, layer_configs, load_json_file};
use serde::{Deserialize, Serialize};

/// Name used for the default config file and log files.
pub const APP_NAME: &str = "server_enc";

/// Whether the listener stops after its first connection.
///
/// `once` serves a single connection and exits, for a supervisor that launches
/// one process per request. `forever` keeps accepting until shut down.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    #[default]
    Once,
    Forever,
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "ENC node classifier service", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Port as the first positional argument, the way the plugin manager starts the process.
    #[clap(value_name = "PORT")]
    #[serde(skip)]
    pub port_arg: Option<u16>,

    #[clap(long, env = "ENC_PORT", help = "Port to listen on for RPC connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "ENC_BIND_ADDRESS", help = "Address to bind the listener to.")]
    pub bind_address: Option<String>,

    #[clap(long, env = "ENC_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, value_enum, env = "ENC_SERVE_MODE", help = "Serve one connection and exit, or serve until shut down.")]
    pub serve_mode: Option<ServeMode>,

    #[clap(long, env = "ENC_REQUEST_TIMEOUT_MS", help = "Deadline for a single request in milliseconds.")]
    pub request_timeout_ms: Option<u64>,

    #[clap(long, env = "ENC_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "ENC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "ENC_LOG_TO_FILE", help = "Also write logs to a file in the log directory.")]
    pub log_to_file: Option<bool>,
}

impl Merge for Config {
    // 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port_arg: other.port_arg.or(self.port_arg),
            port: other.port.or(self.port),
            bind_address: other.bind_address.or(self.bind_address),
            config_path: other.config_path.or(self.config_path),
            serve_mode: other.serve_mode.or(self.serve_mode),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_to_file: other.log_to_file.or(self.log_to_file),
        }
    }
}

/// Fully resolved settings the service runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub bind_address: String,
    pub serve_mode: ServeMode,
    pub request_timeout: Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub log_to_file: bool,
}

impl Config {
    fn defaults() -> Config {
        Config {
            bind_address: Some("0.0.0.0".to_string()),
            serve_mode: Some(ServeMode::Once),
            request_timeout_ms: Some(30_000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_to_file: Some(true),
            ..Default::default()
        }
    }

    fn into_settings(self) -> Result<Settings, ConfigError> {
        let port = self
            .port
            .or(self.port_arg)
            .ok_or_else(|| ConfigError::Invalid("a listen port must be given".to_string()))?;
        let request_timeout_ms = self.request_timeout_ms.unwrap_or(30_000);
        if request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("requestTimeoutMs must be greater than zero".to_string()));
        }
        Ok(Settings {
            port,
            bind_address: self.bind_address.unwrap_or_else(|| "0.0.0.0".to_string()),
            serve_mode: self.serve_mode.unwrap_or_default(),
            request_timeout: Duration::from_millis(request_timeout_ms),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            log_to_file: self.log_to_file.unwrap_or(true),
        })
    }
}

/// Layers defaults, the JSON config file and the command line / environment.
pub fn resolve_config(cli: Config) -> Result<Settings, ConfigError> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| default_config_path(APP_NAME));

    let file_config: Option<Config> = load_json_file(&config_file_path)?;

    layer_configs(Config::defaults(), [file_config, Some(cli)]).into_settings()
}

/// Parses the process arguments and resolves the settings.
pub fn load_config() -> Result<Settings, ConfigError> {
    resolve_config(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("server_enc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_positional_port_and_defaults() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("absent.conf");
        let settings = resolve_config(parse(&["4000", "--config-path", absent.to_str().unwrap()])).unwrap();
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.serve_mode, ServeMode::Once);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_file_then_cli_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server_enc.conf");
        std::fs::write(
            &path,
            r#"{"port": 5000, "serveMode": "forever", "requestTimeoutMs": 250, "logLevel": "debug"}"#,
        )
        .unwrap();

        let settings = resolve_config(parse(&["--config-path", path.to_str().unwrap(), "--log-level", "warn"])).unwrap();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.serve_mode, ServeMode::Forever);
        assert_eq!(settings.request_timeout, Duration::from_millis(250));
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn test_missing_port_is_error() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("absent.conf");
        let err = resolve_config(parse(&["--config-path", absent.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_serve_mode_flag() {
        let config = parse(&["4000", "--serve-mode", "forever"]);
        assert_eq!(config.serve_mode, Some(ServeMode::Forever));
    }
}
