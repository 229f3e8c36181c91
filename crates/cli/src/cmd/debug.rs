use anyhow::{Context, Result};
use argp::FromArgs;
use autorevert_core::{
    config::Config,
    models::{CommitJobs, FailureSignature},
    util::short_sha,
};
use autorevert_detector::{
    PatternDetector,
    debug::{CommitContext, analyze_commit},
};

use crate::util::{database, format_time, workflow_list};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Explain why a commit was or was not detected.
#[argp(subcommand, name = "debug")]
pub struct Args {
    #[argp(positional)]
    /// commit SHA or prefix
    commit: String,
    #[argp(positional)]
    /// workflow names, comma or space separated
    workflows: Vec<String>,
    #[argp(option, default = "8")]
    /// hours of surrounding commits to show (default: 8)
    window: u32,
    #[argp(option)]
    /// hours of history to fetch (default: detector.lookback_hours)
    hours: Option<u32>,
    #[argp(switch)]
    /// show the failures of surrounding commits
    show_all_failures: bool,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let workflows = workflow_list(&args.workflows);
    let hours = args.hours.unwrap_or(config.detector.lookback_hours);
    let db = database(config)?;
    let detector = PatternDetector::new(&db, &config.repo.trunk_branch);
    let commits = detector
        .fetch_workflow_commits(&workflows, hours)
        .await
        .context("Failed to fetch workflow data")?;

    println!("Analyzing commit {} in workflow(s): {}", args.commit, workflows.join(", "));
    println!("Using a {}-hour window", args.window);
    for (workflow, commits) in &commits {
        println!();
        println!("--- Workflow: {workflow} ---");
        match analyze_commit(commits, &args.commit, args.window) {
            Some(context) => print_context(&context, args.show_all_failures),
            None => println!("  Commit {} not found ({} commits)", args.commit, commits.len()),
        }
    }
    Ok(())
}

fn print_context(context: &CommitContext, show_all_failures: bool) {
    let target = &context.target;
    let signature = target.signature();
    println!(
        "Target {} ({}): {} jobs, {} failed",
        target.head_sha,
        format_time(target.created_at),
        target.jobs.len(),
        target.failed_jobs().count()
    );
    if target.has_pending_jobs() {
        println!("  Has pending jobs");
    }
    if target.has_restart() {
        println!("  Restarted ({} jobs)", target.restarted_jobs.len());
    }
    for job in target.failed_jobs() {
        println!("  - {}: {}", job.base_name(), job.classification_rule);
    }

    if context.is_detected() {
        println!("PATTERN DETECTED");
    }
    println!("  As newest failing commit: {}", context.as_newest);
    println!("  As first failing commit: {}", context.as_middle);

    println!("Newer commits ({}):", context.after.len());
    for commit in context.after.iter().rev() {
        print_neighbour(commit, &signature, show_all_failures);
    }
    println!("Older commits ({}):", context.before.len());
    for commit in &context.before {
        print_neighbour(commit, &signature, show_all_failures);
    }
}

fn print_neighbour(commit: &CommitJobs, target: &FailureSignature, show_all_failures: bool) {
    let signature = commit.signature();
    let status = if signature.is_empty() {
        "no failures".to_string()
    } else if &signature == target {
        "same failure".to_string()
    } else if show_all_failures {
        format!("failures: {signature}")
    } else {
        let shared = signature.rules().filter(|r| target.contains(r)).count();
        format!("{} failures, {} shared", signature.len(), shared)
    };
    let pending = if commit.has_pending_jobs() { ", pending" } else { "" };
    println!(
        "  {} ({}) {}{}",
        short_sha(&commit.head_sha),
        format_time(commit.created_at),
        status,
        pending
    );
}
