use serde::Serialize;
use ticketdesk_core::config::{AppConfig, LoadOptions};

use crate::commands::{read_store, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_store(&config));
            checks.push(check_log_channel(&config));
            checks.push(check_staff_roles(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["ticket_store", "log_channel", "staff_roles"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_store(config: &AppConfig) -> DoctorCheck {
    let path = &config.tickets.store_path;
    match read_store(path) {
        Ok(Some(document)) => DoctorCheck {
            name: "ticket_store",
            status: CheckStatus::Pass,
            details: format!("`{}` holds {} open ticket(s)", path.display(), document.len()),
        },
        Ok(None) => DoctorCheck {
            name: "ticket_store",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` does not exist yet; it is created on first start",
                path.display()
            ),
        },
        Err(error) => DoctorCheck { name: "ticket_store", status: CheckStatus::Fail, details: error },
    }
}

fn check_log_channel(config: &AppConfig) -> DoctorCheck {
    match &config.tickets.log_channel_id {
        Some(channel_id) => DoctorCheck {
            name: "log_channel",
            status: CheckStatus::Pass,
            details: format!("closures are logged to channel {channel_id}"),
        },
        None => DoctorCheck {
            name: "log_channel",
            status: CheckStatus::Warn,
            details: "tickets.log_channel_id is unset; closures will not be audited".to_string(),
        },
    }
}

fn check_staff_roles(config: &AppConfig) -> DoctorCheck {
    if config.tickets.staff_role_ids.is_empty() {
        DoctorCheck {
            name: "staff_roles",
            status: CheckStatus::Warn,
            details: "no staff roles configured; only the requester can see new tickets"
                .to_string(),
        }
    } else {
        DoctorCheck {
            name: "staff_roles",
            status: CheckStatus::Pass,
            details: format!(
                "{} staff role(s) granted ticket access",
                config.tickets.staff_role_ids.len()
            ),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
