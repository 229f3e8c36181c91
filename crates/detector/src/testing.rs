//! Builders and in-memory fakes shared by the detector tests.

use std::sync::Mutex;

use async_trait::async_trait;
use autorevert_core::{
    Error, JobSource, Result, WorkflowRestarter,
    classify::restart_reference,
    models::{CommitJobs, JobOrigin, JobRow, PushCommit, RestartRequest, WorkflowJob},
};
use time::{Duration, OffsetDateTime, macros::datetime};

pub const EPOCH: OffsetDateTime = datetime!(2025-06-10 00:00:00 UTC);

pub fn at(hour: i64) -> OffsetDateTime { EPOCH + Duration::hours(hour) }

pub fn job(name: &str, conclusion: &str, rule: &str) -> WorkflowJob {
    WorkflowJob {
        id: 0,
        run_id: 0,
        head_sha: String::new(),
        head_branch: "main".to_string(),
        name: name.to_string(),
        conclusion: conclusion.to_string(),
        status: "completed".to_string(),
        classification_rule: rule.to_string(),
        created_at: EPOCH,
        origin: JobOrigin::Original,
    }
}

pub fn pending_job(name: &str) -> WorkflowJob {
    WorkflowJob { status: "in_progress".to_string(), ..job(name, "", "") }
}

pub fn commit(sha: &str, hour: i64, jobs: Vec<WorkflowJob>) -> CommitJobs {
    let mut commit = CommitJobs::new(sha, OffsetDateTime::UNIX_EPOCH);
    for job in jobs {
        commit.push(WorkflowJob { head_sha: sha.to_string(), created_at: at(hour), ..job });
    }
    commit
}

pub fn row(
    workflow: &str,
    sha: &str,
    hour: i64,
    name: &str,
    conclusion: &str,
    rule: &str,
) -> JobRow {
    JobRow {
        workflow_name: workflow.to_string(),
        head_sha: sha.to_string(),
        head_branch: "main".to_string(),
        workflow_event: "push".to_string(),
        run_id: 1,
        id: 1,
        name: name.to_string(),
        conclusion: conclusion.to_string(),
        status: "completed".to_string(),
        classification_rule: rule.to_string(),
        workflow_created_at: at(hour),
    }
}

pub fn restart_row(workflow: &str, sha: &str, hour: i64, conclusion: &str) -> JobRow {
    JobRow {
        head_branch: restart_reference(sha),
        workflow_event: "workflow_dispatch".to_string(),
        ..row(workflow, sha, hour, "build", conclusion, "")
    }
}

pub fn push_commit(sha: &str, hour: i64, message: &str) -> PushCommit {
    PushCommit { sha: sha.to_string(), message: message.to_string(), timestamp: at(hour) }
}

/// Full-length SHA for tests that go through restart validation.
pub fn sha(c: char) -> String { c.to_string().repeat(40) }

#[derive(Default)]
pub struct FakeSource {
    pub rows: Vec<JobRow>,
    pub history: Vec<PushCommit>,
    pub restarted: Vec<(String, String)>,
    pub fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSource {
    fn record(&self, call: String) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.fail {
            return Err(Error::Query("connection refused".to_string()));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobSource for FakeSource {
    async fn workflow_jobs(
        &self,
        workflow_names: &[String],
        _since: OffsetDateTime,
        _trunk_branch: &str,
    ) -> Result<Vec<JobRow>> {
        self.record(format!("workflow_jobs {}", workflow_names.join(",")))?;
        let rows = self.rows.iter().filter(|r| workflow_names.contains(&r.workflow_name));
        Ok(rows.cloned().collect())
    }

    async fn commit_history(
        &self,
        _since: OffsetDateTime,
        _trunk_branch: &str,
    ) -> Result<Vec<PushCommit>> {
        self.record("commit_history".to_string())?;
        Ok(self.history.clone())
    }

    async fn has_restarted_workflow(&self, workflow_name: &str, commit_sha: &str) -> Result<bool> {
        self.record(format!("has_restarted_workflow {workflow_name} {commit_sha}"))?;
        Ok(self.restarted.iter().any(|(w, s)| w == workflow_name && s == commit_sha))
    }
}

#[derive(Default)]
pub struct RecordingRestarter {
    pub requests: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingRestarter {
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WorkflowRestarter for RecordingRestarter {
    async fn restart(&self, commit_sha: &str, workflow_name: &str) -> Result<RestartRequest> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((workflow_name.to_string(), commit_sha.to_string()));
        }
        if self.fail {
            return Err(Error::Dispatch { status: None, message: "connection reset".to_string() });
        }
        Ok(RestartRequest {
            commit_sha: commit_sha.to_string(),
            reference: restart_reference(commit_sha),
            workflow_name: workflow_name.to_string(),
            run_id: None,
        })
    }
}
