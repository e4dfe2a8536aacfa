//! The readiness evaluator: given a PR and a specific commit hash,
//! decides ready / not-ready and classifies the negative result so the
//! Controller can report it or, for the branch
//! rule, treat it as a permanent user error.

use crate::config::RepoConfig;
use crate::forge::{CombinedStatus, PullRequestInfo, ReviewState};
use crate::ids::CommitHash;

/// The outcome of evaluating readiness at a specific commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Open, non-draft, allowed branch, approved-at-commit,
    /// pre-status-green-at-commit.
    Ready,
    /// Not ready, with a classification.
    NotReady(NotReadyReason),
}

impl Readiness {
    /// Convenience check.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Why a PR is not ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The PR is closed.
    Closed,
    /// The PR is a draft.
    Draft,
    /// The PR's base branch is not in the repository's allow-list. This
    /// one is a permanent condition and is surfaced as a user error on
    /// `Request`, not treated as a transient `REQUESTED` state.
    BranchNotAllowed,
    /// No `APPROVED` review survives the latest-per-reviewer-at-commit
    /// filter.
    AwaitingReview,
    /// The latest review from some reviewer at this commit is
    /// `CHANGES_REQUESTED`.
    ChangesRequested,
    /// The combined status at this commit has not finished.
    AwaitingStatus,
    /// The combined status at this commit is `failure` or `error`.
    StatusFailed,
}

/// Evaluate readiness for `pr` at `commit_hash`, using review and status
/// data already fetched from the forge.
///
/// `commit_hash` is passed separately from `pr.head_sha` because callers
/// sometimes re-evaluate against a stored `commit_hash` that may differ
/// from the PR's live head.
#[must_use]
pub fn evaluate(
    config: &RepoConfig,
    pr: &PullRequestInfo,
    commit_hash: &CommitHash,
    reviews: &[crate::forge::Review],
    status: CombinedStatus,
) -> Readiness {
    if !pr.open {
        return Readiness::NotReady(NotReadyReason::Closed);
    }
    if pr.draft {
        return Readiness::NotReady(NotReadyReason::Draft);
    }
    if !config.allowed_branches.iter().any(|b| b == &pr.base_branch) {
        return Readiness::NotReady(NotReadyReason::BranchNotAllowed);
    }
    match approval_at_commit(reviews, commit_hash) {
        Approval::ChangesRequested => return Readiness::NotReady(NotReadyReason::ChangesRequested),
        Approval::NotApproved => return Readiness::NotReady(NotReadyReason::AwaitingReview),
        Approval::Approved => {}
    }
    match status {
        CombinedStatus::Success => Readiness::Ready,
        CombinedStatus::Pending => Readiness::NotReady(NotReadyReason::AwaitingStatus),
        CombinedStatus::Failure => Readiness::NotReady(NotReadyReason::StatusFailed),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Approval {
    Approved,
    NotApproved,
    ChangesRequested,
}

/// The approval rule: discard reviews not at `commit_hash`; keep
/// only the latest remaining review per reviewer; `CHANGES_REQUESTED`
/// blocks; otherwise approved iff at least one `APPROVED` remains.
fn approval_at_commit(reviews: &[crate::forge::Review], commit_hash: &CommitHash) -> Approval {
    use std::collections::HashMap;

    let mut latest_by_reviewer: HashMap<&str, &crate::forge::Review> = HashMap::new();
    for review in reviews {
        if &review.commit_id != commit_hash {
            continue;
        }
        match latest_by_reviewer.get(review.reviewer.as_str()) {
            Some(existing) if existing.submitted_at >= review.submitted_at => {}
            _ => {
                latest_by_reviewer.insert(&review.reviewer, review);
            }
        }
    }

    if latest_by_reviewer.values().any(|r| r.state == ReviewState::ChangesRequested) {
        return Approval::ChangesRequested;
    }
    if latest_by_reviewer.values().any(|r| r.state == ReviewState::Approved) {
        Approval::Approved
    } else {
        Approval::NotApproved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::Review;

    fn config() -> RepoConfig {
        RepoConfig { allowed_branches: vec!["main".to_owned()], ..RepoConfig::default() }
    }

    fn hash(c: char) -> CommitHash {
        CommitHash::new(c.to_string().repeat(40)).unwrap()
    }

    fn pr(open: bool, draft: bool, base: &str) -> PullRequestInfo {
        PullRequestInfo { open, draft, base_branch: base.to_owned(), head_sha: hash('a') }
    }

    fn review(reviewer: &str, commit: CommitHash, state: ReviewState, submitted_at: u64) -> Review {
        Review { reviewer: reviewer.to_owned(), commit_id: commit, state, submitted_at }
    }

    #[test]
    fn closed_pr_is_not_ready() {
        let result = evaluate(&config(), &pr(false, false, "main"), &hash('a'), &[], CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::Closed));
    }

    #[test]
    fn draft_pr_is_not_ready() {
        let result = evaluate(&config(), &pr(true, true, "main"), &hash('a'), &[], CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::Draft));
    }

    #[test]
    fn disallowed_branch_is_not_ready() {
        let result =
            evaluate(&config(), &pr(true, false, "release"), &hash('a'), &[], CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::BranchNotAllowed));
    }

    #[test]
    fn no_reviews_is_awaiting_review() {
        let result = evaluate(&config(), &pr(true, false, "main"), &hash('a'), &[], CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::AwaitingReview));
    }

    #[test]
    fn changes_requested_blocks_even_with_prior_approval() {
        let reviews = vec![
            review("alice", hash('a'), ReviewState::Approved, 1),
            review("bob", hash('a'), ReviewState::ChangesRequested, 2),
        ];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::ChangesRequested));
    }

    #[test]
    fn latest_review_per_reviewer_supersedes_earlier_changes_requested() {
        let reviews = vec![
            review("alice", hash('a'), ReviewState::ChangesRequested, 1),
            review("alice", hash('a'), ReviewState::Approved, 2),
        ];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Success);
        assert_eq!(result, Readiness::Ready);
    }

    #[test]
    fn review_at_different_commit_is_discarded() {
        let reviews = vec![review("alice", hash('b'), ReviewState::Approved, 1)];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Success);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::AwaitingReview));
    }

    #[test]
    fn pending_status_is_awaiting_status() {
        let reviews = vec![review("alice", hash('a'), ReviewState::Approved, 1)];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Pending);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::AwaitingStatus));
    }

    #[test]
    fn failed_status_is_status_failed() {
        let reviews = vec![review("alice", hash('a'), ReviewState::Approved, 1)];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Failure);
        assert_eq!(result, Readiness::NotReady(NotReadyReason::StatusFailed));
    }

    #[test]
    fn fully_satisfied_is_ready() {
        let reviews = vec![review("alice", hash('a'), ReviewState::Approved, 1)];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Success);
        assert_eq!(result, Readiness::Ready);
    }

    #[test]
    fn multiple_reviewers_need_only_one_approval() {
        let reviews = vec![
            review("alice", hash('a'), ReviewState::Commented, 1),
            review("bob", hash('a'), ReviewState::Approved, 2),
        ];
        let result =
            evaluate(&config(), &pr(true, false, "main"), &hash('a'), &reviews, CombinedStatus::Success);
        assert_eq!(result, Readiness::Ready);
    }
}
