use std::{collections::HashMap, sync::OnceLock};

use autorevert_core::models::{PushCommit, RevertInfo};
use regex::Regex;

/// Whether a commit message is a revert generated by `git revert`.
pub fn is_revert_commit(message: &str) -> bool {
    message.starts_with("Revert \"") && message.contains("This reverts commit")
}

/// SHA named in a revert message's `This reverts commit ...` line.
pub fn reverted_sha(message: &str) -> Option<&str> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r"This reverts commit ([0-9a-f]+)\b").unwrap());
    regex.captures(message).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Push history of the trunk branch, indexed for revert lookups.
pub struct RevertIndex {
    commits: Vec<PushCommit>,
    by_sha: HashMap<String, usize>,
}

impl RevertIndex {
    pub fn from_history(commits: Vec<PushCommit>) -> Self {
        let by_sha = commits.iter().enumerate().map(|(i, c)| (c.sha.clone(), i)).collect();
        Self { commits, by_sha }
    }

    pub fn len(&self) -> usize { self.commits.len() }

    pub fn is_empty(&self) -> bool { self.commits.is_empty() }

    pub fn reverts(&self) -> impl Iterator<Item = &PushCommit> {
        self.commits.iter().filter(|c| is_revert_commit(&c.message))
    }

    /// Earliest revert of `sha` pushed after it, matched on the SHA named in the revert
    /// message.
    ///
    /// Returns `None` when `sha` itself is not part of the history, since the time between
    /// the commit and its revert cannot be established.
    pub fn find_revert(&self, sha: &str) -> Option<RevertInfo> {
        let target = &self.commits[*self.by_sha.get(sha)?];
        self.reverts()
            .filter(|c| c.timestamp > target.timestamp && reverted_sha(&c.message) == Some(sha))
            .min_by_key(|c| c.timestamp)
            .map(|revert| RevertInfo {
                reverted_sha: target.sha.clone(),
                revert_sha: revert.sha.clone(),
                revert_message: revert.message.clone(),
                revert_timestamp: revert.timestamp,
                hours_after_target: (revert.timestamp - target.timestamp).as_seconds_f64()
                    / 3600.0,
            })
    }
}
