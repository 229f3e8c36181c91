pub const CONNECTION_TEST: &str = "SELECT 1 AS ok";

/// Jobs of the given workflows on the trunk branch or a restart tag.
pub const WORKFLOW_JOBS: &str = r#"
SELECT
    workflow_name,
    head_sha,
    head_branch,
    workflow_event,
    run_id,
    id,
    name,
    conclusion,
    status,
    ifNull(torchci_classification.rule, '') AS classification_rule,
    workflow_created_at
FROM workflow_job FINAL
WHERE workflow_name IN {workflow_names:Array(String)}
  AND (head_branch = {trunk_branch:String} OR head_branch LIKE 'trunk/%')
  AND workflow_created_at >= {since:DateTime}
ORDER BY workflow_name, workflow_created_at DESC, head_sha, name
"#;

/// Commits pushed to the trunk branch, newest first.
pub const COMMIT_HISTORY: &str = r#"
SELECT DISTINCT
    head_commit.id AS sha,
    head_commit.message AS message,
    head_commit.timestamp AS timestamp
FROM push
WHERE head_commit.timestamp >= {since:DateTime}
  AND ref = {ref:String}
ORDER BY timestamp DESC
"#;

pub const RESTART_EXISTS: &str = r#"
SELECT 1 AS restarted
FROM workflow_job FINAL
WHERE id IN (
    SELECT id
    FROM materialized_views.workflow_job_by_head_sha
    WHERE head_sha = {commit_sha:String}
  )
  AND workflow_event = {workflow_event:String}
  AND head_branch = {head_branch:String}
  AND workflow_name = {workflow_name:String}
LIMIT 1
"#;

pub const RESTARTED_COMMITS: &str = r#"
SELECT DISTINCT
    head_sha,
    head_branch,
    workflow_event
FROM workflow_job FINAL
WHERE workflow_event = {workflow_event:String}
  AND head_branch LIKE 'trunk/%'
  AND workflow_name = {workflow_name:String}
  AND workflow_created_at >= {since:DateTime}
ORDER BY head_sha
"#;
