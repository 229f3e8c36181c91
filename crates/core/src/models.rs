use std::{
    collections::{BTreeSet, HashSet},
    fmt,
};

use octocrab::models::{RunId, workflows::Run};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::util::{
    deserialize_clickhouse_datetime, deserialize_null_as_empty, normalize_job_name,
};

/// One invocation of a named workflow for one commit, as reported by the CI host.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_name: String,
    pub head_sha: String,
    pub head_branch: String,
    pub event: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub run_number: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Run> for WorkflowRun {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            workflow_name: run.name.clone(),
            head_sha: run.head_sha.clone(),
            head_branch: run.head_branch.clone(),
            event: run.event.clone(),
            status: run.status.clone(),
            conclusion: run.conclusion.clone(),
            run_number: run.run_number,
            created_at: OffsetDateTime::from_unix_timestamp(run.created_at.timestamp())
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

/// Raw job row as returned by the job query.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct JobRow {
    pub workflow_name: String,
    pub head_sha: String,
    pub head_branch: String,
    pub workflow_event: String,
    pub run_id: u64,
    pub id: u64,
    pub name: String,
    pub conclusion: String,
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub classification_rule: String,
    #[serde(deserialize_with = "deserialize_clickhouse_datetime")]
    pub workflow_created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOrigin {
    /// Triggered by the push to the trunk branch.
    Original,
    /// Dispatched again against a `trunk/{sha}` tag.
    Restarted,
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Original => "original",
            Self::Restarted => "restarted",
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct WorkflowJob {
    pub id: u64,
    pub run_id: u64,
    pub head_sha: String,
    pub head_branch: String,
    pub name: String,
    pub conclusion: String,
    pub status: String,
    pub classification_rule: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub origin: JobOrigin,
}

impl WorkflowJob {
    pub fn from_row(row: JobRow, origin: JobOrigin) -> Self {
        Self {
            id: row.id,
            run_id: row.run_id,
            head_sha: row.head_sha,
            head_branch: row.head_branch,
            name: row.name,
            conclusion: row.conclusion,
            status: row.status,
            classification_rule: row.classification_rule,
            created_at: row.workflow_created_at,
            origin,
        }
    }

    /// Failed with a classified failure line. Unclassified failures are ignored.
    pub fn is_failure(&self) -> bool {
        self.conclusion == "failure" && !self.classification_rule.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "pending" | "queued" | "in_progress" | "waiting")
    }

    pub fn base_name(&self) -> String { normalize_job_name(&self.name) }
}

/// All jobs of one workflow for a single commit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CommitJobs {
    pub head_sha: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub jobs: Vec<WorkflowJob>,
    pub restarted_jobs: Vec<WorkflowJob>,
}

impl CommitJobs {
    pub fn new(head_sha: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self { head_sha: head_sha.into(), created_at, jobs: vec![], restarted_jobs: vec![] }
    }

    pub fn push(&mut self, job: WorkflowJob) {
        match job.origin {
            JobOrigin::Original => {
                if job.created_at > self.created_at {
                    self.created_at = job.created_at;
                }
                self.jobs.push(job);
            }
            JobOrigin::Restarted => self.restarted_jobs.push(job),
        }
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &WorkflowJob> {
        self.jobs.iter().filter(|j| j.is_failure())
    }

    pub fn has_pending_jobs(&self) -> bool { self.jobs.iter().any(|j| j.is_pending()) }

    pub fn has_restart(&self) -> bool { !self.restarted_jobs.is_empty() }

    pub fn signature(&self) -> FailureSignature {
        FailureSignature(self.failed_jobs().map(|j| j.classification_rule.clone()).collect())
    }

    /// Normalized names of every original job that ran for this commit.
    pub fn job_base_names(&self) -> HashSet<String> {
        self.jobs.iter().map(|j| j.base_name()).collect()
    }
}

/// The set of classification rules that failed for a commit.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct FailureSignature(pub BTreeSet<String>);

impl FailureSignature {
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn rules(&self) -> impl Iterator<Item = &str> { self.0.iter().map(String::as_str) }

    pub fn contains(&self, rule: &str) -> bool { self.0.contains(rule) }
}

impl<S: Into<String>> FromIterator<S> for FailureSignature {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(rule)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PatternKey {
    pub newer_sha: String,
    pub older_sha: String,
    pub signature: FailureSignature,
}

/// A candidate autorevert finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    /// The two adjacent commits sharing the failure, newest first.
    pub failing_commits: [String; 2],
    /// The commit directly before them that does not share the failure.
    pub clean_commit: String,
    pub signature: FailureSignature,
    pub failed_job_names: Vec<String>,
    pub clean_commit_coverage: Vec<String>,
    pub workflows: BTreeSet<String>,
    /// A failing commit still had jobs running, so the signature may be incomplete.
    pub pending: bool,
    pub revert: Option<RevertInfo>,
}

impl Pattern {
    pub fn newer_commit(&self) -> &str { &self.failing_commits[0] }

    pub fn older_commit(&self) -> &str { &self.failing_commits[1] }

    pub fn key(&self) -> PatternKey {
        PatternKey {
            newer_sha: self.failing_commits[0].clone(),
            older_sha: self.failing_commits[1].clone(),
            signature: self.signature.clone(),
        }
    }

    pub fn is_reverted(&self) -> bool { self.revert.is_some() }
}

/// A commit pushed to the trunk branch.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PushCommit {
    pub sha: String,
    pub message: String,
    #[serde(deserialize_with = "deserialize_clickhouse_datetime")]
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevertInfo {
    /// The failing commit the revert undoes.
    pub reverted_sha: String,
    pub revert_sha: String,
    pub revert_message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub revert_timestamp: OffsetDateTime,
    pub hours_after_target: f64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RestartRequest {
    pub commit_sha: String,
    pub reference: String,
    pub workflow_name: String,
    pub run_id: Option<RunId>,
}
