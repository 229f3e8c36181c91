//! Three-commit window detection and cross-workflow deduplication.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use autorevert_core::models::{CommitJobs, Pattern, PatternKey};
use serde::Serialize;

/// Outcome of evaluating one commit as the first failing commit of a window.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The commit has no classified failures.
    NoFailures,
    /// No newer commit exists to confirm the failure.
    NoNewerCommit,
    /// The newer commit fails differently (or not at all).
    NewerSignatureDiffers,
    /// No older commit exists to show the failure is new.
    NoOlderCommit,
    /// The older commit already had the same failure.
    OlderHasSameFailure,
    Detected,
    /// Detected, but a failing commit still has jobs running.
    PendingJobs,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoFailures => "no classified failures",
            Self::NoNewerCommit => "no newer commit to confirm the failure",
            Self::NewerSignatureDiffers => "newer commit has a different failure signature",
            Self::NoOlderCommit => "no older commit to compare against",
            Self::OlderHasSameFailure => "older commit already has the same failure",
            Self::Detected => "pattern detected",
            Self::PendingJobs => "pattern detected, failure signature incomplete (pending jobs)",
        })
    }
}

impl Verdict {
    /// Whether the window produces a pattern.
    pub fn fires(self) -> bool { matches!(self, Self::Detected | Self::PendingJobs) }
}

/// Evaluate `older` as the first failing commit, with `newer` directly after it and `clean`
/// directly before it.
pub fn evaluate_window(
    newer: Option<&CommitJobs>,
    older: &CommitJobs,
    clean: Option<&CommitJobs>,
) -> Verdict {
    let signature = older.signature();
    if signature.is_empty() {
        return Verdict::NoFailures;
    }
    let Some(newer) = newer else {
        return Verdict::NoNewerCommit;
    };
    if newer.signature() != signature {
        return Verdict::NewerSignatureDiffers;
    }
    let Some(clean) = clean else {
        return Verdict::NoOlderCommit;
    };
    if clean.signature() == signature {
        return Verdict::OlderHasSameFailure;
    }
    if newer.has_pending_jobs() || older.has_pending_jobs() {
        return Verdict::PendingJobs;
    }
    Verdict::Detected
}

/// Slide a `[newest, middle, oldest]` window over commits ordered newest first.
pub fn detect_workflow_patterns(workflow: &str, commits: &[CommitJobs]) -> Vec<Pattern> {
    commits
        .windows(3)
        .filter(|w| evaluate_window(Some(&w[0]), &w[1], Some(&w[2])).fires())
        .map(|w| build_pattern(workflow, &w[0], &w[1], &w[2]))
        .collect()
}

fn build_pattern(
    workflow: &str,
    newest: &CommitJobs,
    middle: &CommitJobs,
    clean: &CommitJobs,
) -> Pattern {
    let failed: BTreeSet<String> = newest.failed_jobs().map(|j| j.base_name()).collect();
    let coverage = clean.job_base_names();
    let clean_commit_coverage =
        failed.iter().filter(|name| coverage.contains(*name)).cloned().collect();
    Pattern {
        failing_commits: [newest.head_sha.clone(), middle.head_sha.clone()],
        clean_commit: clean.head_sha.clone(),
        signature: newest.signature(),
        failed_job_names: failed.into_iter().collect(),
        clean_commit_coverage,
        workflows: BTreeSet::from([workflow.to_string()]),
        pending: newest.has_pending_jobs() || middle.has_pending_jobs(),
        revert: None,
    }
}

/// Merge patterns sharing a [`PatternKey`], unioning their workflows.
/// The first occurrence keeps its position.
pub fn deduplicate(patterns: impl IntoIterator<Item = Pattern>) -> Vec<Pattern> {
    let mut out: Vec<Pattern> = vec![];
    let mut index: HashMap<PatternKey, usize> = HashMap::new();
    for pattern in patterns {
        match index.get(&pattern.key()) {
            Some(&i) => out[i].workflows.extend(pattern.workflows),
            None => {
                index.insert(pattern.key(), out.len());
                out.push(pattern);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{commit, job, pending_job};

    #[test]
    fn test_detects_new_failure() {
        let commits = vec![
            commit("c3", 3, vec![job("test (default, 1, 2, linux)", "failure", "pytest failure")]),
            commit("c2", 2, vec![job("test (default, 2, 2, linux)", "failure", "pytest failure")]),
            commit("c1", 1, vec![job("test (default, 1, 2, linux)", "success", "")]),
        ];
        let patterns = detect_workflow_patterns("pull", &commits);
        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.failing_commits, ["c3".to_string(), "c2".to_string()]);
        assert_eq!(pattern.clean_commit, "c1");
        assert_eq!(pattern.signature.to_string(), "pytest failure");
        assert_eq!(pattern.failed_job_names, vec!["test (default, linux)"]);
        assert_eq!(pattern.clean_commit_coverage, vec!["test (default, linux)"]);
        assert_eq!(pattern.workflows, BTreeSet::from(["pull".to_string()]));
        assert!(!pattern.pending);
        assert!(!pattern.is_reverted());
    }

    #[test]
    fn test_window_verdicts() {
        let fail = |sha, time, rule: &str| commit(sha, time, vec![job("build", "failure", rule)]);
        let ok = |sha, time| commit(sha, time, vec![job("build", "success", "")]);
        let pending = |sha, time| {
            commit(sha, time, vec![job("build", "failure", "oom"), pending_job("test")])
        };
        let cases: &[(Option<CommitJobs>, CommitJobs, Option<CommitJobs>, Verdict)] = &[
            (Some(fail("c", 3, "oom")), ok("b", 2), Some(ok("a", 1)), Verdict::NoFailures),
            // unclassified failures do not count
            (Some(fail("c", 3, "oom")), fail("b", 2, ""), Some(ok("a", 1)), Verdict::NoFailures),
            (None, fail("b", 2, "oom"), Some(ok("a", 1)), Verdict::NoNewerCommit),
            (
                Some(ok("c", 3)),
                fail("b", 2, "oom"),
                Some(ok("a", 1)),
                Verdict::NewerSignatureDiffers,
            ),
            (
                Some(fail("c", 3, "segfault")),
                fail("b", 2, "oom"),
                Some(ok("a", 1)),
                Verdict::NewerSignatureDiffers,
            ),
            (Some(pending("c", 3)), fail("b", 2, "oom"), Some(ok("a", 1)), Verdict::PendingJobs),
            (Some(fail("c", 3, "oom")), pending("b", 2), Some(ok("a", 1)), Verdict::PendingJobs),
            // pending jobs never hide the older commit's verdicts
            (Some(pending("c", 3)), fail("b", 2, "oom"), None, Verdict::NoOlderCommit),
            (
                Some(pending("c", 3)),
                fail("b", 2, "oom"),
                Some(fail("a", 1, "oom")),
                Verdict::OlderHasSameFailure,
            ),
            (Some(fail("c", 3, "oom")), fail("b", 2, "oom"), None, Verdict::NoOlderCommit),
            (
                Some(fail("c", 3, "oom")),
                fail("b", 2, "oom"),
                Some(fail("a", 1, "oom")),
                Verdict::OlderHasSameFailure,
            ),
            // a superset on the older commit is still a different signature
            (
                Some(fail("c", 3, "oom")),
                fail("b", 2, "oom"),
                Some(commit(
                    "a",
                    1,
                    vec![job("build", "failure", "oom"), job("lint", "failure", "flake8")],
                )),
                Verdict::Detected,
            ),
            (Some(fail("c", 3, "oom")), fail("b", 2, "oom"), Some(ok("a", 1)), Verdict::Detected),
        ];
        for (i, (newer, older, clean, expected)) in cases.iter().enumerate() {
            let verdict = evaluate_window(newer.as_ref(), older, clean.as_ref());
            assert_eq!(verdict, *expected, "case {i}");
        }
    }

    #[test]
    fn test_pending_jobs_still_detected() {
        let commits = vec![
            commit("c", 3, vec![job("build", "failure", "oom"), pending_job("test")]),
            commit("b", 2, vec![job("build", "failure", "oom")]),
            commit("a", 1, vec![job("build", "success", "")]),
        ];
        let patterns = detect_workflow_patterns("trunk", &commits);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].failing_commits, ["c".to_string(), "b".to_string()]);
        assert_eq!(patterns[0].clean_commit, "a");
        assert!(patterns[0].pending);
    }

    #[test]
    fn test_too_few_commits() {
        let failing = |sha, time| commit(sha, time, vec![job("build", "failure", "oom")]);
        assert!(detect_workflow_patterns("pull", &[]).is_empty());
        assert!(detect_workflow_patterns("pull", &[failing("b", 2)]).is_empty());
        assert!(detect_workflow_patterns("pull", &[failing("b", 2), failing("a", 1)]).is_empty());
    }

    #[test]
    fn test_multiple_windows() {
        let fail = |sha, time, rule: &str| commit(sha, time, vec![job("build", "failure", rule)]);
        let ok = |sha, time| commit(sha, time, vec![job("build", "success", "")]);
        let commits = vec![
            fail("f", 6, "segfault"),
            fail("e", 5, "segfault"),
            fail("d", 4, "oom"),
            fail("c", 3, "oom"),
            ok("b", 2),
            ok("a", 1),
        ];
        let patterns = detect_workflow_patterns("trunk", &commits);
        let commits: Vec<_> = patterns
            .iter()
            .map(|p| (p.newer_commit(), p.older_commit(), p.clean_commit.as_str()))
            .collect();
        assert_eq!(commits, vec![("f", "e", "d"), ("d", "c", "b")]);
    }

    #[test]
    fn test_deduplicate() {
        let fail = |sha, time| commit(sha, time, vec![job("build", "failure", "oom")]);
        let ok = |sha, time| commit(sha, time, vec![job("build", "success", "")]);
        let commits = vec![fail("c", 3), fail("b", 2), ok("a", 1)];
        let pull = detect_workflow_patterns("pull", &commits);
        let trunk = detect_workflow_patterns("trunk", &commits);

        let merged = deduplicate(pull.iter().cloned().chain(trunk.iter().cloned()));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].workflows, BTreeSet::from(["pull".to_string(), "trunk".to_string()]));

        // Idempotent: merging the result with itself changes nothing
        let again = deduplicate(merged.iter().cloned().chain(merged.iter().cloned()));
        assert_eq!(again, merged);

        // Different clean commits do not matter for the key
        let other = detect_workflow_patterns("inductor", &[fail("c", 3), fail("b", 2), ok("z", 0)]);
        let merged = deduplicate(merged.into_iter().chain(other));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].clean_commit, "a");
        assert_eq!(merged[0].workflows.len(), 3);
    }
}
