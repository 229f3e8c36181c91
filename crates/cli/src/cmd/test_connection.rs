use anyhow::{Context, Result};
use argp::FromArgs;
use autorevert_core::config::Config;

use crate::util::database;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Check that the ClickHouse database is reachable.
#[argp(subcommand, name = "test-connection")]
pub struct Args {}

pub async fn run(_args: Args, config: &Config) -> Result<()> {
    let db = database(config)?;
    db.connection_test()
        .await
        .with_context(|| format!("Failed to connect to {}", config.clickhouse.url()))?;
    println!("Connected to ClickHouse at {}", config.clickhouse.url());
    Ok(())
}
