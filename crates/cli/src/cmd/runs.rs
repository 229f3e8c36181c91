use anyhow::Result;
use argp::FromArgs;
use autorevert_core::{classify::classify_job, config::Config, util::short_sha};

use crate::util::{format_time, github};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// List recent runs of a workflow and how they were triggered.
#[argp(subcommand, name = "runs")]
pub struct Args {
    #[argp(option, short = 'w')]
    /// workflow name
    workflow: String,
    #[argp(option, default = "10")]
    /// number of runs to show (default: 10)
    limit: usize,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let client = github(config)?;
    let runs = client.list_workflow_runs(&args.workflow, args.limit).await?;
    if runs.is_empty() {
        println!("No runs found for {}", args.workflow);
        return Ok(());
    }
    let trunk_branch = &config.repo.trunk_branch;
    for run in &runs {
        let origin = match classify_job(&run.head_branch, &run.event, &run.head_sha, trunk_branch) {
            Ok(origin) => origin.to_string(),
            Err(_) => "other".to_string(),
        };
        println!(
            "{} #{} {} {} {} {}/{} {}",
            run.id,
            run.run_number,
            format_time(run.created_at),
            short_sha(&run.head_sha),
            run.head_branch,
            run.status,
            run.conclusion.as_deref().unwrap_or("-"),
            origin
        );
    }
    Ok(())
}
