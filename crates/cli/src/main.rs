mod cmd;
mod util;

use std::path::Path;

use anyhow::{Context, Result};
use argp::FromArgs;
use autorevert_core::config::Config;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(FromArgs, PartialEq, Debug)]
/// Find trunk commits that introduced a new CI failure and restart their workflows.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'c')]
    /// configuration file (default: config.yml)
    config: Option<String>,
    #[argp(switch, short = 'v')]
    /// enable debug logging
    verbose: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Detect(cmd::detect::Args),
    Debug(cmd::debug::Args),
    Restart(cmd::restart::Args),
    Restarted(cmd::restarted::Args),
    Runs(cmd::runs::Args),
    TestConnection(cmd::test_connection::Args),
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);

    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    // stdout is reserved for command output
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter)).init();

    if let Err(e) = run(args).await {
        tracing::error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: TopLevel) -> Result<()> {
    let path = args.config.as_deref().unwrap_or("config.yml");
    let config = Config::load(Path::new(path))
        .with_context(|| format!("Failed to load configuration from {path}"))?;
    match args.command {
        SubCommand::Detect(c_args) => cmd::detect::run(c_args, &config).await,
        SubCommand::Debug(c_args) => cmd::debug::run(c_args, &config).await,
        SubCommand::Restart(c_args) => cmd::restart::run(c_args, &config).await,
        SubCommand::Restarted(c_args) => cmd::restarted::run(c_args, &config).await,
        SubCommand::Runs(c_args) => cmd::runs::run(c_args, &config).await,
        SubCommand::TestConnection(c_args) => cmd::test_connection::run(c_args, &config).await,
    }
}
