pub mod debug;
pub mod patterns;
pub mod restart;
pub mod reverts;
#[cfg(test)]
mod testing;

use std::collections::HashMap;

use autorevert_core::{
    Error, JobSource, Result,
    classify::classify_job,
    models::{CommitJobs, JobRow, Pattern, WorkflowJob},
    util::short_sha,
};
use time::{Duration, OffsetDateTime};

use crate::{
    patterns::{deduplicate, detect_workflow_patterns},
    reverts::RevertIndex,
};

/// Finds commits that introduced a new failure on the trunk branch.
pub struct PatternDetector<'a> {
    source: &'a dyn JobSource,
    trunk_branch: &'a str,
}

impl<'a> PatternDetector<'a> {
    pub fn new(source: &'a dyn JobSource, trunk_branch: &'a str) -> Self {
        Self { source, trunk_branch }
    }

    /// Fetch the jobs of every workflow in one query and group them per commit, newest first.
    pub async fn fetch_workflow_commits(
        &self,
        workflow_names: &[String],
        lookback_hours: u32,
    ) -> Result<Vec<(String, Vec<CommitJobs>)>> {
        let workflows = validate_workflows(workflow_names, lookback_hours)?;
        let since = OffsetDateTime::now_utc() - Duration::hours(lookback_hours.into());
        let rows = self.source.workflow_jobs(&workflows, since, self.trunk_branch).await?;
        tracing::debug!("Fetched {} job rows for {}", rows.len(), workflows.join(", "));
        Ok(group_rows(&workflows, rows, self.trunk_branch))
    }

    /// Detect patterns across all workflows, merged by failing commit pair and signature.
    pub async fn detect(
        &self,
        workflow_names: &[String],
        lookback_hours: u32,
    ) -> Result<Vec<Pattern>> {
        let commits = self.fetch_workflow_commits(workflow_names, lookback_hours).await?;
        let mut found = vec![];
        for (workflow, commits) in &commits {
            if commits.len() < 3 {
                tracing::info!(
                    "Not enough commits for {} ({}), need at least 3",
                    workflow,
                    commits.len()
                );
                continue;
            }
            let patterns = detect_workflow_patterns(workflow, commits);
            tracing::info!(
                "{}: {} commits, {} patterns",
                workflow,
                commits.len(),
                patterns.len()
            );
            found.extend(patterns);
        }

        let mut patterns = deduplicate(found);
        if patterns.is_empty() {
            return Ok(patterns);
        }
        let since = OffsetDateTime::now_utc() - Duration::hours(2 * i64::from(lookback_hours));
        let history = self.source.commit_history(since, self.trunk_branch).await?;
        let index = RevertIndex::from_history(history);
        if index.is_empty() {
            tracing::warn!("No push history on {} to check for reverts", self.trunk_branch);
            return Ok(patterns);
        }
        tracing::debug!(
            "Checking {} patterns against {} pushed commits",
            patterns.len(),
            index.len()
        );
        for pattern in &mut patterns {
            pattern.revert = index.find_revert(pattern.newer_commit());
            if let Some(revert) = &pattern.revert {
                tracing::info!(
                    "{} reverted by {} after {:.1}h",
                    short_sha(pattern.newer_commit()),
                    short_sha(&revert.revert_sha),
                    revert.hours_after_target
                );
            }
        }
        Ok(patterns)
    }
}

/// Collapse duplicate workflow names (first-seen order) and check the detection inputs.
pub fn validate_workflows(workflow_names: &[String], lookback_hours: u32) -> Result<Vec<String>> {
    let mut workflows: Vec<String> = Vec::with_capacity(workflow_names.len());
    for name in workflow_names.iter().map(|w| w.trim()).filter(|w| !w.is_empty()) {
        if !workflows.iter().any(|w| w == name) {
            workflows.push(name.to_string());
        }
    }
    if workflows.is_empty() {
        return Err(Error::InvalidArgument("At least one workflow name is required".to_string()));
    }
    if lookback_hours == 0 {
        return Err(Error::InvalidArgument("Lookback hours must be positive".to_string()));
    }
    Ok(workflows)
}

/// Partition job rows by workflow and commit.
///
/// Rows matching neither the original nor the restart convention are dropped. Commits with
/// restart jobs only are dropped as well, since their original outcome is unknown.
pub fn group_rows(
    workflows: &[String],
    rows: Vec<JobRow>,
    trunk_branch: &str,
) -> Vec<(String, Vec<CommitJobs>)> {
    let mut grouped: Vec<HashMap<String, CommitJobs>> = vec![HashMap::new(); workflows.len()];
    for row in rows {
        let Some(i) = workflows.iter().position(|w| *w == row.workflow_name) else {
            continue;
        };
        let origin =
            match classify_job(&row.head_branch, &row.workflow_event, &row.head_sha, trunk_branch) {
                Ok(origin) => origin,
                Err(e) => {
                    tracing::debug!("Skipping job {} ({}): {}", row.id, row.name, e);
                    continue;
                }
            };
        grouped[i]
            .entry(row.head_sha.clone())
            .or_insert_with(|| CommitJobs::new(&row.head_sha, OffsetDateTime::UNIX_EPOCH))
            .push(WorkflowJob::from_row(row, origin));
    }
    workflows
        .iter()
        .zip(grouped)
        .map(|(workflow, commits)| {
            let mut commits: Vec<CommitJobs> =
                commits.into_values().filter(|c| !c.jobs.is_empty()).collect();
            commits.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| a.head_sha.cmp(&b.head_sha))
            });
            (workflow.clone(), commits)
        })
        .collect()
}
