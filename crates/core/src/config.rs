use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    pub github: Option<GitHubConfig>,
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClickHouseConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_clickhouse_port")]
    pub port: u16,
    #[serde(default = "default_clickhouse_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_clickhouse_database")]
    pub database: String,
    #[serde(default = "default_true")]
    pub secure: bool,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_clickhouse_port(),
            user: default_clickhouse_user(),
            password: String::new(),
            database: default_clickhouse_database(),
            secure: true,
        }
    }
}

impl ClickHouseConfig {
    /// Base URL of the HTTP interface.
    pub fn url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            return self.host.trim_end_matches('/').to_string();
        }
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepoConfig {
    #[serde(default = "default_repo_owner")]
    pub owner: String,
    #[serde(default = "default_repo_name")]
    pub name: String,
    #[serde(default = "default_trunk_branch")]
    pub trunk_branch: String,
    /// Inputs sent with every workflow dispatch.
    #[serde(default)]
    pub dispatch_inputs: BTreeMap<String, String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: default_repo_owner(),
            name: default_repo_name(),
            trunk_branch: default_trunk_branch(),
            dispatch_inputs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// Workflows checked by `restart` when none are given.
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { workflows: vec![], lookback_hours: default_lookback_hours(), dry_run: false }
    }
}

fn default_clickhouse_port() -> u16 { 8443 }

fn default_clickhouse_user() -> String { "default".to_string() }

fn default_clickhouse_database() -> String { "default".to_string() }

fn default_true() -> bool { true }

fn default_repo_owner() -> String { "pytorch".to_string() }

fn default_repo_name() -> String { "pytorch".to_string() }

fn default_trunk_branch() -> String { "main".to_string() }

fn default_lookback_hours() -> u32 { 48 }

impl Config {
    /// Load the configuration file (if it exists), apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let file = File::open(path).map_err(|e| {
                Error::Configuration(format!("Failed to open {}: {}", path.display(), e))
            })?;
            Self::from_reader(BufReader::new(file))?
        } else {
            tracing::debug!("No config file at {}, using environment only", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        serde_yaml::from_reader(reader)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))
    }

    /// Override values with `CLICKHOUSE_*`, `GITHUB_TOKEN` and `DRY_RUN` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(host) = var("CLICKHOUSE_HOST") {
            self.clickhouse.host = host;
        }
        if let Some(port) = var("CLICKHOUSE_PORT") {
            self.clickhouse.port = port.parse().map_err(|_| {
                Error::Configuration(format!("CLICKHOUSE_PORT is not a valid port: {port}"))
            })?;
        }
        if let Some(user) = var("CLICKHOUSE_USER") {
            self.clickhouse.user = user;
        }
        if let Some(password) = var("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = password;
        }
        if let Some(database) = var("CLICKHOUSE_DATABASE") {
            self.clickhouse.database = database;
        }
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github = Some(GitHubConfig { token });
        }
        if let Some(dry_run) = var("DRY_RUN") {
            self.detector.dry_run = dry_run.eq_ignore_ascii_case("true") || dry_run == "1";
        }
        Ok(())
    }

    /// The ClickHouse host is checked when the database client is built, so commands that
    /// only talk to GitHub run without it.
    pub fn validate(&self) -> Result<()> {
        if self.repo.trunk_branch.is_empty() {
            return Err(Error::Configuration("Trunk branch must not be empty".to_string()));
        }
        if self.detector.lookback_hours == 0 {
            return Err(Error::Configuration("Lookback hours must be positive".to_string()));
        }
        Ok(())
    }

    /// GitHub token, required for anything that talks to the CI host.
    pub fn github_token(&self) -> Result<&str> {
        self.github
            .as_ref()
            .map(|github| github.token.as_str())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                Error::Configuration(
                    "GitHub token is required; set GITHUB_TOKEN or github.token".to_string(),
                )
            })
    }
}
