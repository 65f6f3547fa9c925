use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use ticketdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".to_string());
    let entries = vec![
        entry(
            "gateway.bot_token",
            redact_token(config.gateway.bot_token.expose_secret()),
            &["TICKETDESK_GATEWAY_BOT_TOKEN"],
        ),
        entry(
            "gateway.api_base_url",
            config.gateway.api_base_url.clone(),
            &["TICKETDESK_GATEWAY_API_BASE_URL"],
        ),
        entry(
            "gateway.timeout_secs",
            config.gateway.timeout_secs.to_string(),
            &["TICKETDESK_GATEWAY_TIMEOUT_SECS"],
        ),
        entry(
            "tickets.store_path",
            config.tickets.store_path.display().to_string(),
            &["TICKETDESK_TICKETS_STORE_PATH"],
        ),
        entry(
            "tickets.category_id",
            optional(&config.tickets.category_id),
            &["TICKETDESK_TICKETS_CATEGORY_ID"],
        ),
        entry(
            "tickets.staff_role_ids",
            if config.tickets.staff_role_ids.is_empty() {
                "<none>".to_string()
            } else {
                config.tickets.staff_role_ids.join(",")
            },
            &["TICKETDESK_TICKETS_STAFF_ROLE_IDS"],
        ),
        entry(
            "tickets.log_channel_id",
            optional(&config.tickets.log_channel_id),
            &["TICKETDESK_TICKETS_LOG_CHANNEL_ID"],
        ),
        entry(
            "tickets.close_grace_secs",
            config.tickets.close_grace_secs.to_string(),
            &["TICKETDESK_TICKETS_CLOSE_GRACE_SECS"],
        ),
        entry(
            "tickets.panel_command",
            config.tickets.panel_command.clone(),
            &["TICKETDESK_TICKETS_PANEL_COMMAND"],
        ),
        entry(
            "tickets.channel_prefix",
            config.tickets.channel_prefix.clone(),
            &["TICKETDESK_TICKETS_CHANNEL_PREFIX"],
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["TICKETDESK_SERVER_BIND_ADDRESS"],
        ),
        entry(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["TICKETDESK_SERVER_HEALTH_CHECK_PORT"],
        ),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["TICKETDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["TICKETDESK_LOGGING_LEVEL", "TICKETDESK_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TICKETDESK_LOGGING_FORMAT", "TICKETDESK_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    Entry { key, value, env_keys }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Bot tokens carry no meaningful prefix, so only the length leaks.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    format!("<redacted:{} chars>", trimmed.chars().count())
}
