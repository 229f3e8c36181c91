//! Original vs. restarted job classification.
//!
//! A restart dispatches the workflow against a lightweight tag named `trunk/{sha}`, so the
//! restarted run reports that tag as its head branch. Runs triggered by the push to trunk report
//! the trunk branch itself.

use crate::{Error, Result, models::JobOrigin};

/// Event of runs triggered by a push to the trunk branch.
pub const PUSH_EVENT: &str = "push";

/// Event of runs created through the workflow dispatch API.
pub const DISPATCH_EVENT: &str = "workflow_dispatch";

/// Reference a restart of `commit_sha` is dispatched against.
pub fn restart_reference(commit_sha: &str) -> String { format!("trunk/{commit_sha}") }

/// Classify a job by its head branch and trigger event.
///
/// Fails with [`Error::Indeterminate`] when the job matches neither convention; such jobs
/// belong to neither category.
pub fn classify_job(
    head_branch: &str,
    event: &str,
    head_sha: &str,
    trunk_branch: &str,
) -> Result<JobOrigin> {
    if !head_sha.is_empty() && head_branch == restart_reference(head_sha) {
        Ok(JobOrigin::Restarted)
    } else if head_branch == trunk_branch && event == PUSH_EVENT {
        Ok(JobOrigin::Original)
    } else {
        Err(Error::Indeterminate { head_branch: head_branch.to_string(), event: event.to_string() })
    }
}
