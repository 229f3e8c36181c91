use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};

const CLICKHOUSE_DATETIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Strip the shard suffix from a job name, so that
/// `test (default, 1, 3, linux.4xlarge)` and `test (default, 2, 3, linux.4xlarge)` compare equal.
pub fn normalize_job_name(name: &str) -> String {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r", \d+, \d+, ").unwrap());
    regex.replace_all(name, ", ").into_owned()
}

/// First 8 characters of a commit SHA, for display.
pub fn short_sha(sha: &str) -> &str { sha.get(..8).unwrap_or(sha) }

/// Whether `sha` is a full 40 character hexadecimal commit hash.
pub fn is_full_sha(sha: &str) -> bool {
    sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Split a workflow list given as `pull,trunk` or `pull trunk`.
/// Empty entries are dropped and duplicates collapsed, keeping first-seen order.
pub fn parse_workflow_names(value: &str) -> Vec<String> {
    let parts: Vec<&str> = if value.contains(',') {
        value.split(',').collect()
    } else {
        value.split_whitespace().collect()
    };
    let mut out: Vec<String> = Vec::with_capacity(parts.len());
    for part in parts {
        let part = part.trim();
        if !part.is_empty() && !out.iter().any(|w| w == part) {
            out.push(part.to_string());
        }
    }
    out
}

/// Workflow file to dispatch for a workflow name (`trunk` -> `trunk.yml`).
pub fn workflow_file(workflow_name: &str) -> String {
    if workflow_name.ends_with(".yml") || workflow_name.ends_with(".yaml") {
        workflow_name.to_string()
    } else {
        format!("{workflow_name}.yml")
    }
}

/// Workflow name for a workflow file (`trunk.yml` -> `trunk`).
pub fn workflow_name(workflow_file: &str) -> &str {
    workflow_file
        .strip_suffix(".yml")
        .or_else(|| workflow_file.strip_suffix(".yaml"))
        .unwrap_or(workflow_file)
}

/// Format a timestamp the way ClickHouse parses `DateTime` parameters (UTC).
pub fn format_clickhouse_datetime(value: OffsetDateTime) -> String {
    let value = value.to_offset(time::UtcOffset::UTC);
    PrimitiveDateTime::new(value.date(), value.time())
        .format(CLICKHOUSE_DATETIME)
        .unwrap_or_default()
}

pub fn parse_clickhouse_datetime(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    // DateTime64 columns carry fractional seconds
    let value = value.split_once('.').map_or(value, |(whole, _)| whole);
    Ok(PrimitiveDateTime::parse(value, CLICKHOUSE_DATETIME)?.assume_utc())
}

pub fn deserialize_clickhouse_datetime<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where D: Deserializer<'de> {
    let value = String::deserialize(deserializer)?;
    parse_clickhouse_datetime(&value).map_err(serde::de::Error::custom)
}

/// `Nullable(String)` columns decode to an empty string.
pub fn deserialize_null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_normalize_job_name() {
        let cases: &[(&str, &str)] = &[
            (
                "linux-jammy-py3.9-gcc11 / test (default, 1, 5, linux.2xlarge)",
                "linux-jammy-py3.9-gcc11 / test (default, linux.2xlarge)",
            ),
            (
                "linux-jammy-py3.9-gcc11 / test (default, 4, 5, linux.2xlarge)",
                "linux-jammy-py3.9-gcc11 / test (default, linux.2xlarge)",
            ),
            ("linux-jammy-py3.9-gcc11 / build", "linux-jammy-py3.9-gcc11 / build"),
        ];
        for &(name, expected) in cases {
            assert_eq!(normalize_job_name(name), expected);
        }
    }

    #[test]
    fn test_parse_workflow_names() {
        let cases: &[(&str, &[&str])] = &[
            ("pull", &["pull"]),
            ("pull,trunk,inductor", &["pull", "trunk", "inductor"]),
            ("pull, trunk", &["pull", "trunk"]),
            ("pull trunk", &["pull", "trunk"]),
            ("pull,,trunk,pull", &["pull", "trunk"]),
            ("", &[]),
        ];
        for &(value, expected) in cases {
            assert_eq!(parse_workflow_names(value), expected, "input {value:?}");
        }
    }

    #[test]
    fn test_sha_helpers() {
        let sha = "2d3615f5d1c2e8f2a9b7c4d3e2f1a0b9c8d7e6f5";
        assert!(is_full_sha(sha));
        assert!(!is_full_sha("2d3615f5"));
        assert!(!is_full_sha("zd3615f5d1c2e8f2a9b7c4d3e2f1a0b9c8d7e6f5"));
        assert_eq!(short_sha(sha), "2d3615f5");
        assert_eq!(short_sha("abc"), "abc");
    }

    #[test]
    fn test_workflow_file() {
        assert_eq!(workflow_file("trunk"), "trunk.yml");
        assert_eq!(workflow_file("trunk.yml"), "trunk.yml");
        assert_eq!(workflow_file("nightly.yaml"), "nightly.yaml");
        assert_eq!(workflow_name("trunk.yml"), "trunk");
        assert_eq!(workflow_name("pull"), "pull");
    }

    #[test]
    fn test_clickhouse_datetime() {
        let value = datetime!(2025-06-10 08:30:05 UTC);
        assert_eq!(format_clickhouse_datetime(value), "2025-06-10 08:30:05");
        assert_eq!(parse_clickhouse_datetime("2025-06-10 08:30:05").unwrap(), value);
        assert_eq!(parse_clickhouse_datetime("2025-06-10 08:30:05.123").unwrap(), value);
        assert!(parse_clickhouse_datetime("2025-06-10T08:30:05Z").is_err());
        // Non-UTC offsets are converted before formatting
        let value = datetime!(2025-06-10 10:30:05 +02:00);
        assert_eq!(format_clickhouse_datetime(value), "2025-06-10 08:30:05");
    }
}
