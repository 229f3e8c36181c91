//! Explains why a single commit was or was not flagged.

use autorevert_core::models::CommitJobs;
use serde::Serialize;
use time::Duration;

pub use crate::patterns::Verdict;
use crate::patterns::evaluate_window;

/// A commit and its surroundings within one workflow.
#[derive(Debug, Clone, Serialize)]
pub struct CommitContext {
    pub target: CommitJobs,
    /// Adjacent newer commit.
    pub newer: Option<CommitJobs>,
    /// Adjacent older commit.
    pub older: Option<CommitJobs>,
    /// Commits within the window after the target, nearest first.
    pub after: Vec<CommitJobs>,
    /// Commits within the window before the target, nearest first.
    pub before: Vec<CommitJobs>,
    /// Verdict with the target as the newest commit of the window.
    pub as_newest: Verdict,
    /// Verdict with the target as the middle commit, where a new failure is first seen.
    pub as_middle: Verdict,
}

impl CommitContext {
    pub fn is_detected(&self) -> bool {
        self.as_newest.fires() || self.as_middle.fires()
    }
}

/// Index of the commit matching a SHA prefix. A leading `g` (as in `git describe` output)
/// is ignored.
pub fn find_commit(commits: &[CommitJobs], prefix: &str) -> Option<usize> {
    let prefix = prefix.trim();
    let prefix = prefix.strip_prefix('g').unwrap_or(prefix);
    if prefix.is_empty() {
        return None;
    }
    commits.iter().position(|c| c.head_sha.starts_with(prefix))
}

/// Build the context of the commit matching `prefix` in commits ordered newest first.
pub fn analyze_commit(
    commits: &[CommitJobs],
    prefix: &str,
    window_hours: u32,
) -> Option<CommitContext> {
    let i = find_commit(commits, prefix)?;
    let target = &commits[i];
    let window = Duration::hours(window_hours.into());

    let after = commits[..i]
        .iter()
        .rev()
        .take_while(|c| c.created_at - target.created_at <= window)
        .cloned()
        .collect();
    let before = commits[i + 1..]
        .iter()
        .take_while(|c| target.created_at - c.created_at <= window)
        .cloned()
        .collect();

    let newer = i.checked_sub(1).map(|j| &commits[j]);
    let older = commits.get(i + 1);
    let as_newest = match older {
        Some(older) => evaluate_window(Some(target), older, commits.get(i + 2)),
        None => Verdict::NoOlderCommit,
    };
    let as_middle = evaluate_window(newer, target, older);

    Some(CommitContext {
        target: target.clone(),
        newer: newer.cloned(),
        older: older.cloned(),
        after,
        before,
        as_newest,
        as_middle,
    })
}
