use anyhow::Result;
use argp::FromArgs;
use autorevert_core::{JobSource, config::Config};

use crate::util::database;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Show which commits have been restarted for a workflow.
#[argp(subcommand, name = "restarted")]
pub struct Args {
    #[argp(option, short = 'w')]
    /// workflow name
    workflow: String,
    #[argp(option)]
    /// check a single commit
    commit: Option<String>,
    #[argp(option, default = "7")]
    /// days of history to search (default: 7)
    days: u32,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let db = database(config)?;
    if let Some(commit) = &args.commit {
        let restarted = db.has_restarted_workflow(&args.workflow, commit).await?;
        if restarted {
            println!("{} has been restarted for {}", args.workflow, commit);
        } else {
            println!("{} has not been restarted for {}", args.workflow, commit);
        }
        return Ok(());
    }
    let commits = db.restarted_commits(&args.workflow, args.days).await?;
    println!(
        "{} commits with restarts of {} in the last {} days",
        commits.len(),
        args.workflow,
        args.days
    );
    for commit in commits {
        println!("  {commit}");
    }
    Ok(())
}
