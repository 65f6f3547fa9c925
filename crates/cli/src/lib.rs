pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ticketdesk",
    about = "Ticketdesk operator CLI",
    long_about = "Inspect ticketdesk configuration, readiness, and the open-ticket store.",
    after_help = "Examples:\n  ticketdesk doctor --json\n  ticketdesk config\n  ticketdesk tickets"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, gateway settings, and ticket store readability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List open tickets from the store as structured JSON")]
    Tickets,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Tickets => commands::tickets::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
