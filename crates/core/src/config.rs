use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub tickets: TicketConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TicketConfig {
    pub store_path: PathBuf,
    pub category_id: Option<String>,
    pub staff_role_ids: Vec<String>,
    pub log_channel_id: Option<String>,
    pub close_grace_secs: u64,
    pub panel_command: String,
    pub channel_prefix: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub api_base_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub category_id: Option<String>,
    pub staff_role_ids: Option<Vec<String>>,
    pub log_channel_id: Option<String>,
    pub close_grace_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                bot_token: String::new().into(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                timeout_secs: 15,
            },
            tickets: TicketConfig {
                store_path: PathBuf::from("tickets.json"),
                category_id: None,
                staff_role_ids: Vec::new(),
                log_channel_id: None,
                close_grace_secs: 5,
                panel_command: "!ticket".to_string(),
                channel_prefix: "ticket".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ticketdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gateway) = patch.gateway {
            if let Some(bot_token_value) = gateway.bot_token {
                self.gateway.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = gateway.api_base_url {
                self.gateway.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
        }

        if let Some(tickets) = patch.tickets {
            if let Some(store_path) = tickets.store_path {
                self.tickets.store_path = store_path;
            }
            if let Some(category_id) = tickets.category_id {
                self.tickets.category_id = non_empty(category_id);
            }
            if let Some(staff_role_ids) = tickets.staff_role_ids {
                self.tickets.staff_role_ids = staff_role_ids;
            }
            if let Some(log_channel_id) = tickets.log_channel_id {
                self.tickets.log_channel_id = non_empty(log_channel_id);
            }
            if let Some(close_grace_secs) = tickets.close_grace_secs {
                self.tickets.close_grace_secs = close_grace_secs;
            }
            if let Some(panel_command) = tickets.panel_command {
                self.tickets.panel_command = panel_command;
            }
            if let Some(channel_prefix) = tickets.channel_prefix {
                self.tickets.channel_prefix = channel_prefix;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TICKETDESK_GATEWAY_BOT_TOKEN") {
            self.gateway.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TICKETDESK_GATEWAY_API_BASE_URL") {
            self.gateway.api_base_url = value;
        }
        if let Some(value) = read_env("TICKETDESK_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("TICKETDESK_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TICKETDESK_TICKETS_STORE_PATH") {
            self.tickets.store_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_CATEGORY_ID") {
            self.tickets.category_id = Some(value);
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_STAFF_ROLE_IDS") {
            self.tickets.staff_role_ids = parse_list(&value);
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_LOG_CHANNEL_ID") {
            self.tickets.log_channel_id = Some(value);
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_CLOSE_GRACE_SECS") {
            self.tickets.close_grace_secs =
                parse_u64("TICKETDESK_TICKETS_CLOSE_GRACE_SECS", &value)?;
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_PANEL_COMMAND") {
            self.tickets.panel_command = value;
        }
        if let Some(value) = read_env("TICKETDESK_TICKETS_CHANNEL_PREFIX") {
            self.tickets.channel_prefix = value;
        }

        if let Some(value) = read_env("TICKETDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TICKETDESK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TICKETDESK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TICKETDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TICKETDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TICKETDESK_LOGGING_LEVEL").or_else(|| read_env("TICKETDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TICKETDESK_LOGGING_FORMAT").or_else(|| read_env("TICKETDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.gateway.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.api_base_url {
            self.gateway.api_base_url = api_base_url;
        }
        if let Some(store_path) = overrides.store_path {
            self.tickets.store_path = store_path;
        }
        if let Some(category_id) = overrides.category_id {
            self.tickets.category_id = Some(category_id);
        }
        if let Some(staff_role_ids) = overrides.staff_role_ids {
            self.tickets.staff_role_ids = staff_role_ids;
        }
        if let Some(log_channel_id) = overrides.log_channel_id {
            self.tickets.log_channel_id = Some(log_channel_id);
        }
        if let Some(close_grace_secs) = overrides.close_grace_secs {
            self.tickets.close_grace_secs = close_grace_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_tickets(&self.tickets)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ticketdesk.toml"), PathBuf::from("config/ticketdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.bot_token is required (set TICKETDESK_GATEWAY_BOT_TOKEN or [gateway].bot_token)"
                .to_string(),
        ));
    }

    let base_url = gateway.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "gateway.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_tickets(tickets: &TicketConfig) -> Result<(), ConfigError> {
    if tickets.store_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("tickets.store_path must not be empty".to_string()));
    }

    if tickets.staff_role_ids.iter().any(|role_id| role_id.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "tickets.staff_role_ids must not contain empty role ids".to_string(),
        ));
    }

    if tickets.close_grace_secs > 600 {
        return Err(ConfigError::Validation(
            "tickets.close_grace_secs must be in range 0..=600".to_string(),
        ));
    }

    if tickets.panel_command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "tickets.panel_command must not be empty".to_string(),
        ));
    }

    let prefix = tickets.channel_prefix.trim();
    let valid_prefix = !prefix.is_empty()
        && prefix.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_');
    if !valid_prefix {
        return Err(ConfigError::Validation(
            "tickets.channel_prefix must be non-empty and use only [a-z0-9_-]".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gateway: Option<GatewayPatch>,
    tickets: Option<TicketPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TicketPatch {
    store_path: Option<PathBuf>,
    category_id: Option<String>,
    staff_role_ids: Option<Vec<String>>,
    log_channel_id: Option<String>,
    close_grace_secs: Option<u64>,
    panel_command: Option<String>,
    channel_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
