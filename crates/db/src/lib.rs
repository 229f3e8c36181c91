mod queries;

use std::{collections::BTreeSet, time::Instant};

use async_trait::async_trait;
use autorevert_core::{
    Error, JobSource, Result,
    classify::{DISPATCH_EVENT, classify_job, restart_reference},
    config::ClickHouseConfig,
    models::{JobOrigin, JobRow, PushCommit},
    util::{format_clickhouse_datetime, workflow_name},
};
use moka::future::Cache;
use serde::{Deserialize, de::DeserializeOwned};
use time::{Duration, OffsetDateTime};
use url::Url;

/// Client for the ClickHouse HTTP interface.
#[derive(Clone)]
pub struct Database {
    client: reqwest::Client,
    url: Url,
    user: String,
    password: String,
    database: String,
    restart_cache: Cache<RestartKey, bool>,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct RestartKey {
    workflow_name: String,
    commit_sha: String,
}

/// Server-side query parameters, bound to `{name:Type}` placeholders.
#[derive(Debug, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self { Self::default() }

    pub fn string(mut self, name: &str, value: &str) -> Self {
        self.0.push((name.to_string(), value.to_string()));
        self
    }

    pub fn datetime(mut self, name: &str, value: OffsetDateTime) -> Self {
        self.0.push((name.to_string(), format_clickhouse_datetime(value)));
        self
    }

    pub fn string_array(mut self, name: &str, values: &[String]) -> Self {
        self.0.push((name.to_string(), format_string_array(values)));
        self
    }
}

/// Text form of an `Array(String)` parameter: `['a','b']`.
fn format_string_array(values: &[String]) -> String {
    let mut out = String::from("[");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('\'');
        for c in value.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                c => out.push(c),
            }
        }
        out.push('\'');
    }
    out.push(']');
    out
}

#[derive(Deserialize)]
struct RestartedRow {
    head_sha: String,
    head_branch: String,
    workflow_event: String,
}

impl Database {
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(Error::Configuration(
                "ClickHouse host is not set (CLICKHOUSE_HOST)".to_string(),
            ));
        }
        let url = Url::parse(&config.url()).map_err(|e| {
            Error::Configuration(format!("Invalid ClickHouse URL {}: {}", config.url(), e))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("autorevert/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {e}")))?;
        let restart_cache = Cache::<RestartKey, bool>::builder().max_capacity(16384).build();
        Ok(Self {
            client,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            restart_cache,
        })
    }

    /// Run a query and decode every `JSONEachRow` line as `T`.
    ///
    /// Any undecodable line fails the whole query; rows are never partially returned.
    pub async fn query<T>(&self, sql: &str, params: QueryParams) -> Result<Vec<T>>
    where T: DeserializeOwned {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("database", &self.database);
            pairs.append_pair("default_format", "JSONEachRow");
            pairs.append_pair("output_format_json_quote_64bit_integers", "0");
            for (name, value) in &params.0 {
                pairs.append_pair(&format!("param_{name}"), value);
            }
        }
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| Error::Query(format!("Request to ClickHouse failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Query(format!("Failed to read ClickHouse response: {e}")))?;
        if !status.is_success() {
            return Err(Error::Query(format!("ClickHouse returned {}: {}", status, body.trim())));
        }
        let rows = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .map_err(|e| Error::Query(format!("Malformed row {}: {}", i + 1, e)))
            })
            .collect::<Result<Vec<T>>>()?;
        tracing::debug!("Query returned {} rows in {}ms", rows.len(), start.elapsed().as_millis());
        Ok(rows)
    }

    pub async fn connection_test(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct Row {
            #[allow(dead_code)]
            ok: u8,
        }
        let rows: Vec<Row> = self.query(queries::CONNECTION_TEST, QueryParams::new()).await?;
        if rows.is_empty() {
            return Err(Error::Query("Connection test returned no rows".to_string()));
        }
        Ok(())
    }

    /// Commits that have a dispatch restart of `workflow` created in the last `days_back` days.
    pub async fn restarted_commits(
        &self,
        workflow: &str,
        days_back: u32,
    ) -> Result<BTreeSet<String>> {
        let workflow = workflow_name(workflow);
        let since = OffsetDateTime::now_utc() - Duration::days(days_back.into());
        let rows: Vec<RestartedRow> = self
            .query(
                queries::RESTARTED_COMMITS,
                QueryParams::new()
                    .string("workflow_event", DISPATCH_EVENT)
                    .string("workflow_name", workflow)
                    .datetime("since", since),
            )
            .await?;
        let mut commits = BTreeSet::new();
        for row in rows {
            // `trunk/%` also matches tags pointing at other commits
            match classify_job(&row.head_branch, &row.workflow_event, &row.head_sha, "") {
                Ok(JobOrigin::Restarted) => {
                    commits.insert(row.head_sha);
                }
                _ => tracing::debug!(
                    "Ignoring {} on {} for {}",
                    row.workflow_event,
                    row.head_branch,
                    row.head_sha
                ),
            }
        }
        for commit_sha in &commits {
            let key =
                RestartKey { workflow_name: workflow.to_string(), commit_sha: commit_sha.clone() };
            self.restart_cache.insert(key, true).await;
        }
        Ok(commits)
    }

    pub fn clear_cache(&self) { self.restart_cache.invalidate_all() }
}

#[async_trait]
impl JobSource for Database {
    async fn workflow_jobs(
        &self,
        workflow_names: &[String],
        since: OffsetDateTime,
        trunk_branch: &str,
    ) -> Result<Vec<JobRow>> {
        tracing::info!(
            "Fetching workflow data for {} workflows since {}",
            workflow_names.len(),
            format_clickhouse_datetime(since)
        );
        self.query(
            queries::WORKFLOW_JOBS,
            QueryParams::new()
                .string_array("workflow_names", workflow_names)
                .string("trunk_branch", trunk_branch)
                .datetime("since", since),
        )
        .await
    }

    async fn commit_history(
        &self,
        since: OffsetDateTime,
        trunk_branch: &str,
    ) -> Result<Vec<PushCommit>> {
        self.query(
            queries::COMMIT_HISTORY,
            QueryParams::new()
                .string("ref", &format!("refs/heads/{trunk_branch}"))
                .datetime("since", since),
        )
        .await
    }

    async fn has_restarted_workflow(&self, workflow_name: &str, commit_sha: &str) -> Result<bool> {
        let workflow = autorevert_core::util::workflow_name(workflow_name);
        let key =
            RestartKey { workflow_name: workflow.to_string(), commit_sha: commit_sha.to_string() };
        if let Some(restarted) = self.restart_cache.get(&key).await {
            return Ok(restarted);
        }
        #[derive(Deserialize)]
        struct Row {
            #[allow(dead_code)]
            restarted: u8,
        }
        let rows: Vec<Row> = self
            .query(
                queries::RESTART_EXISTS,
                QueryParams::new()
                    .string("commit_sha", commit_sha)
                    .string("workflow_event", DISPATCH_EVENT)
                    .string("head_branch", &restart_reference(commit_sha))
                    .string("workflow_name", workflow),
            )
            .await?;
        let restarted = !rows.is_empty();
        self.restart_cache.insert(key, restarted).await;
        Ok(restarted)
    }
}
