pub mod classify;
pub mod config;
pub mod models;
pub mod util;

use async_trait::async_trait;
use http::StatusCode;
use time::OffsetDateTime;

use crate::models::{JobRow, PushCommit, RestartRequest};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Dispatch failed ({}): {message}", display_status(.status))]
    Dispatch { status: Option<StatusCode>, message: String },
    #[error("Indeterminate job classification (head_branch={head_branch:?}, event={event:?})")]
    Indeterminate { head_branch: String, event: String },
}

fn display_status(status: &Option<StatusCode>) -> String {
    status.map_or_else(|| "no status".to_string(), |s| s.to_string())
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read-only access to historical workflow job data.
///
/// Implemented by the analytical store client; tests substitute an in-memory fake.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Jobs for every named workflow created at or after `since`, on the trunk branch or a
    /// `trunk/{sha}` restart branch. One round trip covers all workflows.
    async fn workflow_jobs(
        &self,
        workflow_names: &[String],
        since: OffsetDateTime,
        trunk_branch: &str,
    ) -> Result<Vec<JobRow>>;

    /// Commits pushed to the trunk branch at or after `since`, newest first.
    async fn commit_history(
        &self,
        since: OffsetDateTime,
        trunk_branch: &str,
    ) -> Result<Vec<PushCommit>>;

    /// Whether a dispatch restart of `workflow_name` exists for `commit_sha`.
    async fn has_restarted_workflow(&self, workflow_name: &str, commit_sha: &str) -> Result<bool>;
}

/// Re-dispatches a workflow for a commit.
#[async_trait]
pub trait WorkflowRestarter: Send + Sync {
    async fn restart(&self, commit_sha: &str, workflow_name: &str) -> Result<RestartRequest>;
}
