use std::collections::BTreeMap;

use async_trait::async_trait;
use autorevert_core::{
    Error, Result, WorkflowRestarter,
    classify::{DISPATCH_EVENT, classify_job, restart_reference},
    config::RepoConfig,
    models::{JobOrigin, RestartRequest, WorkflowRun},
    util::{is_full_sha, workflow_file, workflow_name},
};
use http::StatusCode;
use octocrab::{GitHubError, Octocrab, params::repos::Reference};

/// Dispatches workflow restarts and lists workflow runs for one repository.
#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub owner: String,
    pub repo: String,
    inputs: BTreeMap<String, String>,
}

fn dispatch_error(e: octocrab::Error) -> Error {
    match e {
        octocrab::Error::GitHub { source, .. } => {
            Error::Dispatch { status: Some(source.status_code), message: source.message }
        }
        e => Error::Dispatch { status: None, message: e.to_string() },
    }
}

impl GitHub {
    pub fn new(token: &str, repo: &RepoConfig) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create GitHub client: {e}")))?;
        Ok(Self::with_client(client, repo))
    }

    /// Client against a different API root, such as GitHub Enterprise or a mock server.
    pub fn with_base_uri(token: &str, repo: &RepoConfig, base_uri: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .base_uri(base_uri)
            .map_err(|e| Error::Configuration(format!("Invalid GitHub API URL {base_uri}: {e}")))?
            .personal_token(token.to_string())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create GitHub client: {e}")))?;
        Ok(Self::with_client(client, repo))
    }

    fn with_client(client: Octocrab, repo: &RepoConfig) -> Self {
        Self {
            client,
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
            inputs: repo.dispatch_inputs.clone(),
        }
    }

    /// Re-run `workflow_name` for `commit_sha` by dispatching it against the `trunk/{sha}` tag.
    ///
    /// The dispatch endpoint only acknowledges the request, so the returned request carries no
    /// run id. Use [`GitHub::resolve_restart_run`] to find the run once it has been created.
    pub async fn restart(&self, commit_sha: &str, workflow_name: &str) -> Result<RestartRequest> {
        if !is_full_sha(commit_sha) {
            return Err(Error::InvalidArgument(format!(
                "Expected a full 40 character commit SHA, got {commit_sha:?}"
            )));
        }
        if workflow_name.is_empty() {
            return Err(Error::InvalidArgument("Workflow name must not be empty".to_string()));
        }
        let reference = restart_reference(commit_sha);
        self.ensure_tag(&reference, commit_sha).await?;

        let file = workflow_file(workflow_name);
        let inputs = serde_json::to_value(&self.inputs)
            .map_err(|e| Error::InvalidArgument(format!("Invalid dispatch inputs: {e}")))?;
        self.client
            .actions()
            .create_workflow_dispatch(&self.owner, &self.repo, &file, &reference)
            .inputs(inputs)
            .send()
            .await
            .map_err(dispatch_error)?;
        tracing::info!(
            "Dispatched {} for {} on {}/{}",
            file,
            reference,
            self.owner,
            self.repo
        );
        Ok(RestartRequest {
            commit_sha: commit_sha.to_string(),
            reference,
            workflow_name: workflow_name.to_string(),
            run_id: None,
        })
    }

    /// Create the lightweight tag `tag` pointing at `commit_sha` unless it already exists.
    pub async fn ensure_tag(&self, tag: &str, commit_sha: &str) -> Result<()> {
        let reference = Reference::Tag(tag.to_string());
        let repos = self.client.repos(&self.owner, &self.repo);
        match repos.get_ref(&reference).await {
            Ok(_) => {
                tracing::debug!("Tag {} already exists", tag);
                return Ok(());
            }
            Err(octocrab::Error::GitHub { source, .. })
                if matches!(*source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }) => {}
            Err(e) => return Err(dispatch_error(e)),
        }
        repos.create_ref(&reference, commit_sha).await.map_err(dispatch_error)?;
        tracing::info!("Created tag {} for commit {}", tag, commit_sha);
        Ok(())
    }

    /// Most recent runs of a workflow, newest first.
    pub async fn list_workflow_runs(
        &self,
        workflow_name: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowRun>> {
        self.fetch_runs(workflow_name, limit, None, None).await
    }

    /// Look up the run created for a restart request, if it exists yet.
    pub async fn resolve_restart_run(
        &self,
        request: &RestartRequest,
    ) -> Result<Option<WorkflowRun>> {
        let runs = self
            .fetch_runs(&request.workflow_name, 20, Some(&request.reference), Some(DISPATCH_EVENT))
            .await?;
        Ok(pick_restart_run(runs, request))
    }

    async fn fetch_runs(
        &self,
        workflow_name: &str,
        limit: usize,
        branch: Option<&str>,
        event: Option<&str>,
    ) -> Result<Vec<WorkflowRun>> {
        let file = workflow_file(workflow_name);
        let per_page = limit.clamp(1, 100) as u8;
        let mut runs = Vec::with_capacity(limit);
        let mut page = 1u32;
        while runs.len() < limit {
            let workflows = self.client.workflows(&self.owner, &self.repo);
            let mut builder = workflows.list_runs(&file).per_page(per_page).page(page);
            if let Some(branch) = branch {
                builder = builder.branch(branch);
            }
            if let Some(event) = event {
                builder = builder.event(event);
            }
            let items = match builder.send().await {
                Ok(result) if result.items.is_empty() => break,
                Ok(result) => result.items,
                Err(octocrab::Error::GitHub { source, .. })
                    if matches!(*source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }) =>
                {
                    tracing::warn!("Workflow {} not found in {}/{}", file, self.owner, self.repo);
                    break;
                }
                Err(e) => {
                    return Err(Error::Query(format!(
                        "Failed to fetch runs of {file} (page {page}): {e}"
                    )));
                }
            };
            let count = items.len();
            runs.extend(items.iter().map(WorkflowRun::from));
            if count < per_page as usize {
                break;
            }
            page += 1;
        }
        runs.truncate(limit);
        Ok(runs)
    }
}

/// Newest run that is a restart of the requested commit.
fn pick_restart_run(runs: Vec<WorkflowRun>, request: &RestartRequest) -> Option<WorkflowRun> {
    let name = workflow_name(&request.workflow_name);
    runs.into_iter()
        .filter(|run| run.head_sha == request.commit_sha)
        .filter(|run| run.workflow_name.is_empty() || run.workflow_name == name)
        .filter(|run| {
            matches!(
                classify_job(&run.head_branch, &run.event, &run.head_sha, ""),
                Ok(JobOrigin::Restarted)
            )
        })
        .max_by_key(|run| run.created_at)
}

#[async_trait]
impl WorkflowRestarter for GitHub {
    async fn restart(&self, commit_sha: &str, workflow_name: &str) -> Result<RestartRequest> {
        GitHub::restart(self, commit_sha, workflow_name).await
    }
}
