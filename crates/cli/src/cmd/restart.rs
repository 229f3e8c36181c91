use anyhow::{Context, Result, bail};
use argp::FromArgs;
use autorevert_core::{config::Config, util::is_full_sha};
use autorevert_detector::{
    PatternDetector,
    restart::{RestartOutcome, RestartPlanner},
};

use crate::util::{database, github};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Restart workflows for detected patterns, or one workflow for one commit.
#[argp(subcommand, name = "restart")]
pub struct Args {
    #[argp(option, short = 'w')]
    /// workflow to restart (requires --commit)
    workflow: Option<String>,
    #[argp(option)]
    /// full commit SHA to restart (requires --workflow)
    commit: Option<String>,
    #[argp(switch)]
    /// show what would be restarted without dispatching
    dry_run: bool,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let dry_run = args.dry_run || config.detector.dry_run;
    let db = database(config)?;
    let client = if dry_run { None } else { Some(github(config)?) };
    let planner = match &client {
        Some(client) => RestartPlanner::new(&db, client),
        None => RestartPlanner::dry_run(&db),
    };

    let outcomes = match (args.workflow, args.commit) {
        (Some(workflow), Some(commit)) => {
            if !is_full_sha(&commit) {
                bail!("Expected a full 40 character commit SHA, got {commit:?}");
            }
            vec![planner.restart_one(&workflow, &commit).await?]
        }
        (None, None) => {
            let workflows = &config.detector.workflows;
            if workflows.is_empty() {
                bail!(
                    "No workflows configured; set detector.workflows or pass --workflow and \
                     --commit"
                );
            }
            let detector = PatternDetector::new(&db, &config.repo.trunk_branch);
            let patterns = detector
                .detect(workflows, config.detector.lookback_hours)
                .await
                .context("Pattern detection failed")?;
            tracing::info!("Found {} patterns", patterns.len());
            planner.run(&patterns).await?
        }
        _ => bail!("--workflow and --commit must be given together"),
    };

    if outcomes.is_empty() {
        println!("Nothing to restart");
    }
    for outcome in &outcomes {
        match outcome {
            RestartOutcome::Dispatched(request) => {
                println!("Restarted {} for {}", request.workflow_name, request.reference)
            }
            RestartOutcome::AlreadyRestarted { workflow_name, commit_sha } => {
                println!("Already restarted {workflow_name} for {commit_sha}")
            }
            RestartOutcome::DryRun { workflow_name, commit_sha } => {
                println!("Would restart {workflow_name} for {commit_sha}")
            }
        }
    }

    // The dispatch API does not return the run, look it up once
    if let Some(client) = &client {
        for outcome in &outcomes {
            let RestartOutcome::Dispatched(request) = outcome else {
                continue;
            };
            match client.resolve_restart_run(request).await {
                Ok(Some(run)) => {
                    println!("  {} run {}: {}", request.workflow_name, run.id, run.status)
                }
                Ok(None) => tracing::debug!("No run for {} yet", request.reference),
                Err(e) => tracing::warn!("Failed to look up run for {}: {}", request.reference, e),
            }
        }
    }
    Ok(())
}
