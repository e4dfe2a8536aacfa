//! Transactional persistence for pull requests and merge attempts.
//!
//! An associated `Error` type, one method per capability, `#[must_use]`
//! getters that return `Option`/`Vec` rather than erroring on "not
//! found". The Controller is the only caller, and owns enforcing the
//! data model's invariants against the rows it reads and writes — the
//! Store itself only guarantees that each individual call is atomic.
//!
//! A durable backend (any transactional key/value or relational store)
//! is out of scope; [`InMemoryStore`] is the reference implementation
//! and the one used in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ids::{MergeAttemptId, PrNumber, RepoRef};
use crate::model::{MergeAttempt, PullRequest};

/// Transactional persistence for [`PullRequest`] and [`MergeAttempt`]
/// rows, scoped by repository.
///
/// # Errors
/// Every fallible method returns `Self::Error`; the Controller treats any
/// `Err` as transient and leaves state for the poller to re-drive.
pub trait Store {
    /// The error type returned by a failed store operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch one PR row.
    fn get_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<Option<PullRequest>, Self::Error>;

    /// Insert or overwrite a PR row.
    fn put_pr(&self, pr: PullRequest) -> Result<(), Self::Error>;

    /// Delete a PR row. Idempotent: deleting a row that does not exist is
    /// not an error.
    fn delete_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<(), Self::Error>;

    /// List every PR row for a repository, in no particular order. Used
    /// by the Controller to find admission candidates and by the poller
    /// to find due timeouts.
    fn list_prs(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, Self::Error>;

    /// Fetch one MergeAttempt row.
    fn get_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<Option<MergeAttempt>, Self::Error>;

    /// Insert or overwrite a MergeAttempt row.
    fn put_attempt(&self, attempt: MergeAttempt) -> Result<(), Self::Error>;

    /// Delete a MergeAttempt row. Idempotent.
    fn delete_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<(), Self::Error>;

    /// List every MergeAttempt row for a repository. Used to enforce
    /// at most one non-`SPLIT` attempt in flight before admission.
    fn list_attempts(&self, repo: &RepoRef) -> Result<Vec<MergeAttempt>, Self::Error>;
}

/// Lets a [`Controller`](crate::controller::Controller) and its callers
/// share one backend by handle (e.g. one `Arc<InMemoryStore>` wired into
/// several Controllers, or kept by a test for direct seeding/inspection)
/// without the trait itself knowing about reference counting.
impl<T: Store> Store for std::sync::Arc<T> {
    type Error = T::Error;

    fn get_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<Option<PullRequest>, Self::Error> {
        (**self).get_pr(repo, number)
    }

    fn put_pr(&self, pr: PullRequest) -> Result<(), Self::Error> {
        (**self).put_pr(pr)
    }

    fn delete_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<(), Self::Error> {
        (**self).delete_pr(repo, number)
    }

    fn list_prs(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, Self::Error> {
        (**self).list_prs(repo)
    }

    fn get_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<Option<MergeAttempt>, Self::Error> {
        (**self).get_attempt(repo, id)
    }

    fn put_attempt(&self, attempt: MergeAttempt) -> Result<(), Self::Error> {
        (**self).put_attempt(attempt)
    }

    fn delete_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<(), Self::Error> {
        (**self).delete_attempt(repo, id)
    }

    fn list_attempts(&self, repo: &RepoRef) -> Result<Vec<MergeAttempt>, Self::Error> {
        (**self).list_attempts(repo)
    }
}

/// An in-memory [`Store`], keyed by repository. Each repository's rows
/// are guarded by their own mutex, matching the per-`(owner, repo)`
/// serialization decision: two different repositories never
/// contend, and every operation on one repository is strictly ordered
/// with respect to every other.
#[derive(Default)]
pub struct InMemoryStore {
    repos: Mutex<HashMap<RepoRef, Mutex<RepoRows>>>,
}

#[derive(Default)]
struct RepoRows {
    prs: HashMap<PrNumber, PullRequest>,
    attempts: HashMap<MergeAttemptId, MergeAttempt>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_repo<R>(&self, repo: &RepoRef, f: impl FnOnce(&mut RepoRows) -> R) -> R {
        let mut repos = self.repos.lock().expect("store mutex poisoned");
        let slot = repos.entry(repo.clone()).or_default();
        let mut rows = slot.lock().expect("repo mutex poisoned");
        f(&mut rows)
    }
}

/// [`InMemoryStore`] never fails; this type exists only to satisfy
/// [`Store::Error`]'s trait bounds.
#[derive(Debug)]
pub struct Infallible;

impl std::fmt::Display for Infallible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("infallible")
    }
}

impl std::error::Error for Infallible {}

impl Store for InMemoryStore {
    type Error = Infallible;

    fn get_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<Option<PullRequest>, Self::Error> {
        Ok(self.with_repo(repo, |rows| rows.prs.get(&number).cloned()))
    }

    fn put_pr(&self, pr: PullRequest) -> Result<(), Self::Error> {
        let repo = pr.repo.clone();
        let number = pr.number;
        self.with_repo(&repo, |rows| {
            rows.prs.insert(number, pr);
        });
        Ok(())
    }

    fn delete_pr(&self, repo: &RepoRef, number: PrNumber) -> Result<(), Self::Error> {
        self.with_repo(repo, |rows| {
            rows.prs.remove(&number);
        });
        Ok(())
    }

    fn list_prs(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, Self::Error> {
        Ok(self.with_repo(repo, |rows| rows.prs.values().cloned().collect()))
    }

    fn get_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<Option<MergeAttempt>, Self::Error> {
        Ok(self.with_repo(repo, |rows| rows.attempts.get(id).cloned()))
    }

    fn put_attempt(&self, attempt: MergeAttempt) -> Result<(), Self::Error> {
        let repo = attempt.repo.clone();
        let id = attempt.id.clone();
        self.with_repo(&repo, |rows| {
            rows.attempts.insert(id, attempt);
        });
        Ok(())
    }

    fn delete_attempt(&self, repo: &RepoRef, id: &MergeAttemptId) -> Result<(), Self::Error> {
        self.with_repo(repo, |rows| {
            rows.attempts.remove(id);
        });
        Ok(())
    }

    fn list_attempts(&self, repo: &RepoRef) -> Result<Vec<MergeAttempt>, Self::Error> {
        Ok(self.with_repo(repo, |rows| rows.attempts.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CommitHash, Owner, RepoName};
    use crate::model::{AttemptState, PrState};

    fn repo() -> RepoRef {
        RepoRef { owner: Owner::new("acme").unwrap(), repo: RepoName::new("widgets").unwrap() }
    }

    fn hash(c: char) -> CommitHash {
        CommitHash::new(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn put_then_get_pr_roundtrips() {
        let store = InMemoryStore::new();
        let pr = PullRequest::new(repo(), PrNumber(1), hash('a'), false, 10);
        store.put_pr(pr.clone()).unwrap();
        assert_eq!(store.get_pr(&repo(), PrNumber(1)).unwrap(), Some(pr));
    }

    #[test]
    fn get_missing_pr_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_pr(&repo(), PrNumber(99)).unwrap(), None);
    }

    #[test]
    fn delete_pr_is_idempotent() {
        let store = InMemoryStore::new();
        store.delete_pr(&repo(), PrNumber(1)).unwrap();
        let pr = PullRequest::new(repo(), PrNumber(1), hash('a'), false, 10);
        store.put_pr(pr).unwrap();
        store.delete_pr(&repo(), PrNumber(1)).unwrap();
        store.delete_pr(&repo(), PrNumber(1)).unwrap();
        assert_eq!(store.get_pr(&repo(), PrNumber(1)).unwrap(), None);
    }

    #[test]
    fn list_prs_returns_all_rows_for_repo() {
        let store = InMemoryStore::new();
        store.put_pr(PullRequest::new(repo(), PrNumber(1), hash('a'), false, 10)).unwrap();
        store.put_pr(PullRequest::new(repo(), PrNumber(2), hash('b'), true, 10)).unwrap();
        let mut rows = store.list_prs(&repo()).unwrap();
        rows.sort_by_key(|r| r.number);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, PrNumber(1));
        assert_eq!(rows[1].number, PrNumber(2));
    }

    #[test]
    fn different_repos_do_not_share_rows() {
        let store = InMemoryStore::new();
        let other = RepoRef { owner: Owner::new("other").unwrap(), repo: RepoName::new("thing").unwrap() };
        store.put_pr(PullRequest::new(repo(), PrNumber(1), hash('a'), false, 10)).unwrap();
        assert!(store.list_prs(&other).unwrap().is_empty());
    }

    #[test]
    fn attempt_roundtrips() {
        let store = InMemoryStore::new();
        let id = MergeAttemptId::new("a1").unwrap();
        let attempt = MergeAttempt::new(id.clone(), repo(), 5);
        store.put_attempt(attempt.clone()).unwrap();
        assert_eq!(store.get_attempt(&repo(), &id).unwrap(), Some(attempt));
    }

    #[test]
    fn list_attempts_reflects_state_updates() {
        let store = InMemoryStore::new();
        let id = MergeAttemptId::new("a1").unwrap();
        let mut attempt = MergeAttempt::new(id.clone(), repo(), 5);
        store.put_attempt(attempt.clone()).unwrap();
        attempt.transition(AttemptState::Testing, 10).unwrap();
        store.put_attempt(attempt).unwrap();
        let rows = store.list_attempts(&repo()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, AttemptState::Testing);
    }

    #[test]
    fn pr_state_is_preserved_across_roundtrip() {
        let store = InMemoryStore::new();
        let mut pr = PullRequest::new(repo(), PrNumber(3), hash('c'), true, 1);
        pr.transition(PrState::Merging, 2).unwrap();
        store.put_pr(pr.clone()).unwrap();
        let back = store.get_pr(&repo(), PrNumber(3)).unwrap().unwrap();
        assert_eq!(back.state, PrState::Merging);
    }
}
