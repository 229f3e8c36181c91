use anyhow::{Context, Result};
use autorevert_core::{config::Config, util::parse_workflow_names};
use autorevert_db::Database;
use autorevert_github::GitHub;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const DISPLAY_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Workflow names from positional arguments, each comma- or space-separated.
pub fn workflow_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for name in values.iter().flat_map(|v| parse_workflow_names(v)) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub fn format_time(value: OffsetDateTime) -> String {
    value.format(DISPLAY_TIME).unwrap_or_else(|_| value.to_string())
}

pub fn database(config: &Config) -> Result<Database> {
    tracing::debug!(url = %config.clickhouse.url(), "Connecting to ClickHouse");
    Database::new(&config.clickhouse).context("Failed to create ClickHouse client")
}

pub fn github(config: &Config) -> Result<GitHub> {
    let token = config.github_token()?;
    GitHub::new(token, &config.repo).context("Failed to create GitHub client")
}
