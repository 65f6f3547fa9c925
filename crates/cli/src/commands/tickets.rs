use serde_json::json;
use ticketdesk_core::config::{AppConfig, LoadOptions};

use crate::commands::{read_store, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "tickets",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let document = match read_store(&config.tickets.store_path) {
        Ok(document) => document.unwrap_or_default(),
        Err(error) => return CommandResult::failure("tickets", "ticket_store", error, 4),
    };

    let tickets = document
        .records()
        .into_iter()
        .map(|record| {
            json!({
                "requester_id": record.requester_id.as_str(),
                "channel_id": record.channel_id.as_str(),
            })
        })
        .collect::<Vec<_>>();

    CommandResult::success_with_data(
        "tickets",
        format!("{} open ticket(s)", tickets.len()),
        Some(json!({ "tickets": tickets })),
    )
}
