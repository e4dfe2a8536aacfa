//! The forge client interface.
//!
//! The REST implementation (the actual HTTP calls, auth, and rate-limit
//! handling) is out of scope — this module defines only the trait and
//! its value types, object-safe and doc-commented per method: one
//! capability group per block, programmed against rather than a
//! concrete client imported throughout the codebase.

use crate::ids::{CommitHash, PrId};

/// Errors a [`ForgeClient`] implementation may return. All are treated as
/// transient: the Controller logs and lets the poller re-drive, with no
/// local retry loop.
#[derive(Debug)]
pub struct ForgeError(pub Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for ForgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "forge error: {}", self.0)
    }
}

impl std::error::Error for ForgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// A review state as reported by the forge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewState {
    /// Approving review.
    Approved,
    /// Blocking review.
    ChangesRequested,
    /// Non-blocking comment-only review.
    Commented,
}

/// A single review of a PR, as reported by the forge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Review {
    /// The reviewer's account name.
    pub reviewer: String,
    /// The commit this review was submitted against.
    pub commit_id: CommitHash,
    /// The review's disposition.
    pub state: ReviewState,
    /// Epoch seconds the review was submitted, used to find "the latest
    /// remaining review" per reviewer.
    pub submitted_at: u64,
}

/// The combined status of required checks at a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombinedStatus {
    /// All required checks succeeded.
    Success,
    /// At least one required check is still running.
    Pending,
    /// At least one required check failed.
    Failure,
}

/// The subset of PR metadata the readiness evaluator and Controller need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequestInfo {
    /// Whether the PR is open.
    pub open: bool,
    /// Whether the PR is a draft.
    pub draft: bool,
    /// The PR's configured base/target branch.
    pub base_branch: String,
    /// The PR's current head commit, as reported live by the forge. Used
    /// by `Request` to freeze `commit_hash` and by `Initiate` to detect a
    /// head move since `Request`.
    pub head_sha: CommitHash,
}

/// A single commit produced by the cherry-pick strategy's three-dot
/// compare.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompareCommit {
    /// The commit's SHA.
    pub sha: CommitHash,
    /// Whether this commit has more than one parent (cherry-pick "reject
    /// PRs containing merge commits").
    pub is_merge: bool,
}

/// The forge API abstraction used by the Controller and merge constructor.
///
/// Implementations may be backed by a REST client, a cached proxy, or a
/// test double. This trait is object-safe: no generic methods, no `Self`
/// in return position outside of `Result`.
pub trait ForgeClient {
    /// Fetch the subset of PR metadata readiness needs.
    ///
    /// Replaces: `GET /repos/{owner}/{repo}/pulls/{number}`.
    fn get_pull_request(&self, pr: &PrId) -> Result<PullRequestInfo, ForgeError>;

    /// List all reviews of a PR, in submission order.
    ///
    /// Replaces: `GET /repos/{owner}/{repo}/pulls/{number}/reviews`.
    fn list_reviews(&self, pr: &PrId) -> Result<Vec<Review>, ForgeError>;

    /// Get the combined status of required checks at a commit.
    ///
    /// Replaces: `GET /repos/{owner}/{repo}/commits/{sha}/status`
    /// (optionally joined with check-run results, per configuration).
    ///
    /// This method takes no `RepoConfig`: filtering the forge's raw status
    /// list down to `RepoConfig::required_status_contexts` is the
    /// implementor's responsibility (typically by closing over the
    /// resolved config when constructing the concrete client), not
    /// something the Controller does on the caller's behalf.
    fn combined_status(&self, pr: &PrId, commit: &CommitHash) -> Result<CombinedStatus, ForgeError>;

    /// Read the current tip of a ref (e.g. the target branch, before
    /// construction, or the staging branch, for recovery).
    ///
    /// Replaces: `GET /repos/{owner}/{repo}/git/ref/{ref}`.
    fn get_ref(&self, pr: &PrId, ref_name: &str) -> Result<CommitHash, ForgeError>;

    /// Force-update a ref unconditionally. Used to (re)point the staging
    /// branch at a freshly built commit.
    ///
    /// Replaces: `PATCH /repos/{owner}/{repo}/git/refs/{ref}` with
    /// `force: true`.
    fn force_update_ref(&self, pr: &PrId, ref_name: &str, sha: &CommitHash) -> Result<(), ForgeError>;

    /// Non-forced update of a ref, requiring the ref's current tip to
    /// equal `expected_current`. This is the primitive behind `Complete`'s
    /// fast-forward: "a non-forced update requiring the current
    /// tip to match what was used as `base_sha`."
    ///
    /// Returns `Ok(true)` if the update applied, `Ok(false)` if it was
    /// rejected because the ref's current tip did not match
    /// `expected_current` (the fast-forward race) — a logical
    /// rejection, distinct from `Err`, which is reserved for transient
    /// failures the poller should simply retry against.
    ///
    /// Replaces: `PATCH /repos/{owner}/{repo}/git/refs/{ref}` with
    /// `force: false`.
    fn compare_and_swap_ref(
        &self,
        pr: &PrId,
        ref_name: &str,
        expected_current: &CommitHash,
        new_sha: &CommitHash,
    ) -> Result<bool, ForgeError>;

    /// Perform a server-side merge of `head` onto `base`, returning the
    /// resulting commit, or `None` on conflict.
    ///
    /// Replaces: `POST /repos/{owner}/{repo}/merges`.
    fn create_merge_commit(
        &self,
        pr: &PrId,
        base: &CommitHash,
        head: &CommitHash,
    ) -> Result<Option<CommitHash>, ForgeError>;

    /// Synthesize a new commit that reuses `tree_from`'s tree with a
    /// different parent list. Used by the octopus, squash, batch-squash,
    /// and cherry-pick strategies to assemble a staging commit without a
    /// working tree.
    ///
    /// Replaces: `POST /repos/{owner}/{repo}/git/commits`.
    fn create_commit(
        &self,
        pr: &PrId,
        tree_from: &CommitHash,
        parents: &[CommitHash],
        message: &str,
    ) -> Result<CommitHash, ForgeError>;

    /// Enumerate the commits unique to `head` relative to `base`
    /// (three-dot range), used by the cherry-pick strategy.
    ///
    /// Replaces: `GET /repos/{owner}/{repo}/compare/{base}...{head}`.
    fn compare_commits(
        &self,
        pr: &PrId,
        base: &CommitHash,
        head: &CommitHash,
    ) -> Result<Vec<CompareCommit>, ForgeError>;

    /// Post a comment on a PR (success/failure/conflict report).
    ///
    /// Replaces: `POST /repos/{owner}/{repo}/issues/{number}/comments`.
    fn post_comment(&self, pr: &PrId, body: &str) -> Result<(), ForgeError>;
}

/// Lets a [`Controller`](crate::controller::Controller) and its callers
/// share one forge handle (e.g. an `Arc<FakeForge>` kept by a test for
/// direct seeding/inspection after the Controller has taken ownership of
/// its own handle) without the trait itself knowing about reference
/// counting. Mirrors [`crate::store::Store`]'s identical blanket impl.
impl<T: ForgeClient + ?Sized> ForgeClient for std::sync::Arc<T> {
    fn get_pull_request(&self, pr: &PrId) -> Result<PullRequestInfo, ForgeError> {
        (**self).get_pull_request(pr)
    }
    fn list_reviews(&self, pr: &PrId) -> Result<Vec<Review>, ForgeError> {
        (**self).list_reviews(pr)
    }
    fn combined_status(&self, pr: &PrId, commit: &CommitHash) -> Result<CombinedStatus, ForgeError> {
        (**self).combined_status(pr, commit)
    }
    fn get_ref(&self, pr: &PrId, ref_name: &str) -> Result<CommitHash, ForgeError> {
        (**self).get_ref(pr, ref_name)
    }
    fn force_update_ref(&self, pr: &PrId, ref_name: &str, sha: &CommitHash) -> Result<(), ForgeError> {
        (**self).force_update_ref(pr, ref_name, sha)
    }
    fn compare_and_swap_ref(
        &self,
        pr: &PrId,
        ref_name: &str,
        expected_current: &CommitHash,
        new_sha: &CommitHash,
    ) -> Result<bool, ForgeError> {
        (**self).compare_and_swap_ref(pr, ref_name, expected_current, new_sha)
    }
    fn create_merge_commit(&self, pr: &PrId, base: &CommitHash, head: &CommitHash) -> Result<Option<CommitHash>, ForgeError> {
        (**self).create_merge_commit(pr, base, head)
    }
    fn create_commit(
        &self,
        pr: &PrId,
        tree_from: &CommitHash,
        parents: &[CommitHash],
        message: &str,
    ) -> Result<CommitHash, ForgeError> {
        (**self).create_commit(pr, tree_from, parents, message)
    }
    fn compare_commits(&self, pr: &PrId, base: &CommitHash, head: &CommitHash) -> Result<Vec<CompareCommit>, ForgeError> {
        (**self).compare_commits(pr, base, head)
    }
    fn post_comment(&self, pr: &PrId, body: &str) -> Result<(), ForgeError> {
        (**self).post_comment(pr, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forge_error_display_wraps_inner() {
        let err = ForgeError("rate limited".into());
        assert_eq!(err.to_string(), "forge error: rate limited");
    }

    #[test]
    fn forge_error_has_source() {
        let err = ForgeError("boom".into());
        assert!(std::error::Error::source(&err).is_some());
    }
}
