//! The unified error type for the merge-queue core.
//!
//! Hand-rolled rather than built on `thiserror`: lower-level plumbing
//! can lean on mechanical `Display` derivation, but the outward-facing
//! error type that a human (here, a PR author or operator) reads gets a
//! hand-written `Display` with remediation text.
//!
//! Only the *user error* variants are ever surfaced synchronously (on
//! `Request`/`Cancel`); the rest are logged and
//! left for the poller to re-drive.

use std::fmt;

use crate::ids::PrId;

/// Errors produced by the merge-queue core.
#[derive(Debug)]
pub enum MergeQueueError {
    /// `Request` was called for a PR that already has a row.
    AlreadyQueued {
        /// The PR that was already queued.
        pr: PrId,
    },

    /// The PR's base branch is not in the repository's allow-list: "permanent not-ready (reported as error on Request)".
    BranchNotAllowed {
        /// The PR whose base branch was rejected.
        pr: PrId,
        /// The base branch that was rejected.
        branch: String,
    },

    /// `Request`/`Initiate`/`Cancel` was called for a PR that is closed.
    PrClosed {
        /// The closed PR.
        pr: PrId,
    },

    /// The constructor reported a structural merge conflict.
    MergeConflict {
        /// The PRs whose changes conflicted.
        prs: Vec<PrId>,
    },

    /// CI reported a required-check failure on a staging commit.
    TestFailure {
        /// The PRs in the failing batch.
        prs: Vec<PrId>,
    },

    /// `Complete`'s compare-and-set fast-forward was rejected because the
    /// target branch moved since `base_sha` was read.
    FastForwardRace {
        /// The attempt whose fast-forward was rejected.
        attempt: crate::ids::MergeAttemptId,
    },

    /// The store reported an error. Never surfaced synchronously; the
    /// Controller logs it and leaves state untouched for the next poll.
    Store(Box<dyn std::error::Error + Send + Sync>),

    /// The forge client reported a transient error. Same propagation
    /// policy as `Store`.
    Forge(Box<dyn std::error::Error + Send + Sync>),

    /// A guarded state transition was rejected even though the Controller
    /// believed it was reachable from the row it just read. Indicates a
    /// bug in the Controller's own bookkeeping rather than anything a
    /// caller did; logged and left for the poller the same as `Store`/
    /// `Forge`.
    Invariant(String),
}

impl fmt::Display for MergeQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyQueued { pr } => {
                write!(f, "{pr} is already queued. To fix: wait for the current attempt to resolve, or run cancel first.")
            }
            Self::BranchNotAllowed { pr, branch } => {
                write!(
                    f,
                    "{pr} targets branch `{branch}`, which is not in this repository's allow-list. To fix: retarget the PR to an allowed branch or update the repository configuration."
                )
            }
            Self::PrClosed { pr } => {
                write!(f, "{pr} is closed. To fix: reopen the PR before requesting a merge.")
            }
            Self::MergeConflict { prs } => {
                write!(f, "merge conflict involving {}", format_pr_list(prs))
            }
            Self::TestFailure { prs } => {
                write!(f, "CI failed for batch containing {}", format_pr_list(prs))
            }
            Self::FastForwardRace { attempt } => {
                write!(
                    f,
                    "fast-forward for attempt {attempt} was rejected: the target branch moved. To fix: none needed, the batch will be retried automatically on the new tip."
                )
            }
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Forge(e) => write!(f, "forge error: {e}"),
            Self::Invariant(msg) => write!(f, "internal invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for MergeQueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) | Self::Forge(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl MergeQueueError {
    /// Whether this error is a *user error* — reported back to the PR
    /// author synchronously, with no state change. All other variants
    /// are transient/structural and are handled by the Controller's
    /// internal retry-via-poll policy, never surfaced synchronously.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::AlreadyQueued { .. } | Self::BranchNotAllowed { .. } | Self::PrClosed { .. })
    }
}

fn format_pr_list(prs: &[PrId]) -> String {
    prs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Owner, PrNumber, RepoName, RepoRef};

    fn pr(n: u64) -> PrId {
        PrId {
            repo: RepoRef { owner: Owner::new("acme").unwrap(), repo: RepoName::new("widgets").unwrap() },
            number: PrNumber(n),
        }
    }

    #[test]
    fn already_queued_display_mentions_pr() {
        let e = MergeQueueError::AlreadyQueued { pr: pr(1) };
        assert!(e.to_string().contains("acme/widgets#1"));
        assert!(e.to_string().contains("To fix"));
    }

    #[test]
    fn branch_not_allowed_display() {
        let e = MergeQueueError::BranchNotAllowed { pr: pr(2), branch: "release".into() };
        assert!(e.to_string().contains("release"));
    }

    #[test]
    fn merge_conflict_lists_all_prs() {
        let e = MergeQueueError::MergeConflict { prs: vec![pr(1), pr(2)] };
        let s = e.to_string();
        assert!(s.contains("acme/widgets#1"));
        assert!(s.contains("acme/widgets#2"));
    }

    #[test]
    fn user_error_classification() {
        assert!(MergeQueueError::AlreadyQueued { pr: pr(1) }.is_user_error());
        assert!(MergeQueueError::BranchNotAllowed { pr: pr(1), branch: "x".into() }.is_user_error());
        assert!(MergeQueueError::PrClosed { pr: pr(1) }.is_user_error());
        assert!(!MergeQueueError::MergeConflict { prs: vec![] }.is_user_error());
        assert!(!MergeQueueError::TestFailure { prs: vec![] }.is_user_error());
        assert!(
            !MergeQueueError::FastForwardRace { attempt: crate::ids::MergeAttemptId::new("a").unwrap() }
                .is_user_error()
        );
    }

    #[test]
    fn store_error_has_source() {
        let inner: Box<dyn std::error::Error + Send + Sync> = "boom".into();
        let e = MergeQueueError::Store(inner);
        assert!(std::error::Error::source(&e).is_some());
    }
}
