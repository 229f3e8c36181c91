use std::collections::HashSet;

use autorevert_core::{
    JobSource, Result, WorkflowRestarter,
    models::{Pattern, RestartRequest},
    util::short_sha,
};
use serde::Serialize;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestartOutcome {
    Dispatched(RestartRequest),
    AlreadyRestarted { workflow_name: String, commit_sha: String },
    DryRun { workflow_name: String, commit_sha: String },
}

impl RestartOutcome {
    pub fn workflow_name(&self) -> &str {
        match self {
            Self::Dispatched(request) => &request.workflow_name,
            Self::AlreadyRestarted { workflow_name, .. } | Self::DryRun { workflow_name, .. } => {
                workflow_name
            }
        }
    }

    pub fn commit_sha(&self) -> &str {
        match self {
            Self::Dispatched(request) => &request.commit_sha,
            Self::AlreadyRestarted { commit_sha, .. } | Self::DryRun { commit_sha, .. } => {
                commit_sha
            }
        }
    }
}

/// Restarts the failing commits of detected patterns so the failure can be confirmed.
pub struct RestartPlanner<'a> {
    source: &'a dyn JobSource,
    /// `None` in dry-run mode.
    restarter: Option<&'a dyn WorkflowRestarter>,
}

impl<'a> RestartPlanner<'a> {
    pub fn new(source: &'a dyn JobSource, restarter: &'a dyn WorkflowRestarter) -> Self {
        Self { source, restarter: Some(restarter) }
    }

    /// Report what would be restarted without dispatching anything.
    pub fn dry_run(source: &'a dyn JobSource) -> Self { Self { source, restarter: None } }

    /// Restart both failing commits of every pattern that has not been reverted, once per
    /// workflow the pattern was seen in. Stops at the first dispatch error.
    pub async fn run(&self, patterns: &[Pattern]) -> Result<Vec<RestartOutcome>> {
        let mut seen = HashSet::new();
        let mut outcomes = vec![];
        for pattern in patterns {
            if let Some(revert) = &pattern.revert {
                tracing::info!(
                    "Skipping {}: reverted by {}",
                    short_sha(&revert.reverted_sha),
                    short_sha(&revert.revert_sha)
                );
                continue;
            }
            for workflow in &pattern.workflows {
                for commit_sha in &pattern.failing_commits {
                    if !seen.insert((workflow.clone(), commit_sha.clone())) {
                        continue;
                    }
                    outcomes.push(self.restart_one(workflow, commit_sha).await?);
                }
            }
        }
        Ok(outcomes)
    }

    pub async fn restart_one(&self, workflow: &str, commit_sha: &str) -> Result<RestartOutcome> {
        if self.source.has_restarted_workflow(workflow, commit_sha).await? {
            tracing::info!("{} already restarted for {}", workflow, short_sha(commit_sha));
            return Ok(RestartOutcome::AlreadyRestarted {
                workflow_name: workflow.to_string(),
                commit_sha: commit_sha.to_string(),
            });
        }
        let Some(restarter) = self.restarter else {
            tracing::info!("Would restart {} for {}", workflow, short_sha(commit_sha));
            return Ok(RestartOutcome::DryRun {
                workflow_name: workflow.to_string(),
                commit_sha: commit_sha.to_string(),
            });
        };
        let request = restarter.restart(commit_sha, workflow).await?;
        Ok(RestartOutcome::Dispatched(request))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use autorevert_core::{
        Error,
        models::{FailureSignature, RevertInfo},
    };

    use super::*;
    use crate::testing::{EPOCH, FakeSource, RecordingRestarter, sha};

    fn pattern(newer: char, older: char, workflows: &[&str]) -> Pattern {
        Pattern {
            failing_commits: [sha(newer), sha(older)],
            clean_commit: sha('0'),
            signature: FailureSignature::from_iter(["oom"]),
            failed_job_names: vec!["build".to_string()],
            clean_commit_coverage: vec!["build".to_string()],
            workflows: workflows.iter().map(|w| w.to_string()).collect::<BTreeSet<_>>(),
            pending: false,
            revert: None,
        }
    }

    #[tokio::test]
    async fn test_restarts_failing_commits() {
        let source = FakeSource {
            restarted: vec![("trunk".to_string(), sha('b'))],
            ..Default::default()
        };
        let restarter = RecordingRestarter::default();
        let planner = RestartPlanner::new(&source, &restarter);
        let outcomes = planner
            .run(&[pattern('c', 'b', &["pull", "trunk"]), pattern('b', 'a', &["trunk"])])
            .await
            .unwrap();

        assert_eq!(restarter.requests(), vec![
            ("pull".to_string(), sha('c')),
            ("pull".to_string(), sha('b')),
            ("trunk".to_string(), sha('c')),
            ("trunk".to_string(), sha('a')),
        ]);
        let summary: Vec<_> = outcomes
            .iter()
            .map(|o| {
                let dispatched = matches!(o, RestartOutcome::Dispatched(_));
                (o.workflow_name(), &o.commit_sha()[..1], dispatched)
            })
            .collect();
        assert_eq!(summary, vec![
            ("pull", "c", true),
            ("pull", "b", true),
            ("trunk", "c", true),
            ("trunk", "b", false),
            ("trunk", "a", true),
        ]);
        match &outcomes[0] {
            RestartOutcome::Dispatched(request) => {
                assert_eq!(request.reference, format!("trunk/{}", sha('c')))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_and_reverted() {
        let source = FakeSource::default();
        let mut reverted = pattern('e', 'd', &["pull"]);
        reverted.revert = Some(RevertInfo {
            reverted_sha: sha('e'),
            revert_sha: sha('f'),
            revert_message: "Revert \"x\"".to_string(),
            revert_timestamp: EPOCH,
            hours_after_target: 1.0,
        });
        let planner = RestartPlanner::dry_run(&source);
        let outcomes = planner.run(&[reverted, pattern('c', 'b', &["pull"])]).await.unwrap();
        assert_eq!(outcomes, vec![
            RestartOutcome::DryRun { workflow_name: "pull".to_string(), commit_sha: sha('c') },
            RestartOutcome::DryRun { workflow_name: "pull".to_string(), commit_sha: sha('b') },
        ]);
    }

    #[tokio::test]
    async fn test_errors_abort() {
        let source = FakeSource::default();
        let restarter = RecordingRestarter { fail: true, ..Default::default() };
        let planner = RestartPlanner::new(&source, &restarter);
        let result = planner.run(&[pattern('c', 'b', &["pull", "trunk"])]).await;
        assert!(matches!(result, Err(Error::Dispatch { .. })));
        assert_eq!(restarter.requests().len(), 1);

        let source = FakeSource { fail: true, ..Default::default() };
        let restarter = RecordingRestarter::default();
        let planner = RestartPlanner::new(&source, &restarter);
        let result = planner.run(&[pattern('c', 'b', &["pull"])]).await;
        assert!(matches!(result, Err(Error::Query(_))));
        assert!(restarter.requests().is_empty());
    }
}
