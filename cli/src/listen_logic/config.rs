use clap::Parser;
use lib_notify::ClientConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "notify_listen.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Real-time notification listener", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NOTIFY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NOTIFY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NOTIFY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NOTIFY_ENDPOINT", help = "Notification WebSocket endpoint.")]
    pub endpoint: Option<String>,

    #[clap(long, env = "NOTIFY_TOKEN_PARAM", help = "Query parameter that carries the bearer token.")]
    pub token_param: Option<String>,

    #[clap(long, env = "NOTIFY_ROLE", help = "User role sent in the subscribe handshake (admin, customer, seller).")]
    pub role: Option<String>,

    #[clap(long, env = "NOTIFY_TOKEN", help = "Bearer token for the session.")]
    pub token: Option<String>,

    #[clap(long, env = "NOTIFY_KEYS", value_delimiter = ',', help = "Comma-separated classification keys to listen on.")]
    pub keys: Option<Vec<String>>,

    #[clap(long, env = "NOTIFY_MAX_RETRIES", help = "Automatic reconnection attempts before giving up.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "NOTIFY_RETRY_BASE_DELAY_MS", help = "Base delay in milliseconds; attempt n waits n times this.")]
    pub retry_base_delay_ms: Option<u64>,

    #[clap(long, env = "NOTIFY_CONNECT_TIMEOUT_MS", help = "Timeout in milliseconds for opening the channel.")]
    pub connect_timeout_ms: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            endpoint: other.endpoint.or(self.endpoint),
            token_param: other.token_param.or(self.token_param),
            role: other.role.or(self.role),
            token: other.token.or(self.token),
            keys: other.keys.or(self.keys),
            max_retries: other.max_retries.or(self.max_retries),
            retry_base_delay_ms: other.retry_base_delay_ms.or(self.retry_base_delay_ms),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
        }
    }

    /// The library-level client settings, defaults filled in.
    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            token_param: self.token_param.clone().unwrap_or(defaults.token_param),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_base_delay_ms: self.retry_base_delay_ms.unwrap_or(defaults.retry_base_delay_ms),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
        }
    }
}

fn defaults() -> Config {
    Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        role: Some("customer".to_string()),
        keys: Some(vec!["*".to_string()]),
        ..Default::default()
    }
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

/// Layers defaults < config file < CLI/env. `cli` already includes env vars.
pub fn resolve(cli: Config) -> Config {
    let mut current_config = defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli)
}
