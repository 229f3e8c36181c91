use std::collections::BTreeMap;

use anyhow::{Context, Result};
use argp::FromArgs;
use autorevert_core::{config::Config, models::Pattern, util::short_sha};
use autorevert_detector::PatternDetector;
use serde::Serialize;

use crate::util::{database, format_time, workflow_list};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Detect commits that introduced a new failure on the trunk branch.
#[argp(subcommand, name = "detect")]
pub struct Args {
    #[argp(positional)]
    /// workflow names, comma or space separated
    workflows: Vec<String>,
    #[argp(option)]
    /// hours of history to analyze (default: detector.lookback_hours)
    hours: Option<u32>,
    #[argp(switch)]
    /// print patterns as JSON
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    workflows: &'a [String],
    lookback_hours: u32,
    patterns: &'a [Pattern],
    reverted: usize,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let workflows = workflow_list(&args.workflows);
    let hours = args.hours.unwrap_or(config.detector.lookback_hours);
    let db = database(config)?;
    let detector = PatternDetector::new(&db, &config.repo.trunk_branch);
    let patterns = detector.detect(&workflows, hours).await.context("Pattern detection failed")?;
    let reverted = patterns.iter().filter(|p| p.is_reverted()).count();

    if args.json {
        let report =
            Report { workflows: &workflows, lookback_hours: hours, patterns: &patterns, reverted };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Workflows: {} (last {} hours)", workflows.join(", "), hours);
    if patterns.is_empty() {
        println!("No autorevert patterns detected");
        return Ok(());
    }
    println!("Found {} autorevert patterns:", patterns.len());
    for (i, pattern) in patterns.iter().enumerate() {
        print_pattern(i + 1, pattern);
    }

    let mut per_workflow: BTreeMap<&str, usize> = BTreeMap::new();
    for workflow in patterns.iter().flat_map(|p| &p.workflows) {
        *per_workflow.entry(workflow.as_str()).or_default() += 1;
    }
    println!();
    println!("Summary:");
    println!("  Patterns: {}", patterns.len());
    println!(
        "  Reverted: {} ({:.1}%)",
        reverted,
        reverted as f64 * 100.0 / patterns.len() as f64
    );
    println!("  Not reverted: {}", patterns.len() - reverted);
    for (workflow, count) in per_workflow {
        println!("  {workflow}: {count}");
    }
    Ok(())
}

fn print_pattern(n: usize, pattern: &Pattern) {
    let workflows = pattern.workflows.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    println!();
    println!("{n}. {} [{}]", pattern.older_commit(), workflows);
    println!("   Failure: {}", pattern.signature);
    if pattern.pending {
        println!("   Jobs still running, failure signature may be incomplete");
    }
    println!(
        "   Failing: {}, {} (clean: {})",
        short_sha(pattern.newer_commit()),
        short_sha(pattern.older_commit()),
        short_sha(&pattern.clean_commit)
    );
    for job in &pattern.failed_job_names {
        let covered = pattern.clean_commit_coverage.contains(job);
        println!("   - {}{}", job, if covered { "" } else { " (not run on clean commit)" });
    }
    match &pattern.revert {
        Some(revert) => println!(
            "   Reverted by {} at {} ({:.1}h later)",
            short_sha(&revert.revert_sha),
            format_time(revert.revert_timestamp),
            revert.hours_after_target
        ),
        None => println!("   Not reverted"),
    }
}
