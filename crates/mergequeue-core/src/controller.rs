//! The Controller: the merge-queue state machine proper. Owns
//! every Store write and dispatches to the merge constructor and the
//! forge client; the event router and poller are the only callers.
//!
//! A thin owner of a store plus a forge client, with one public method
//! per operation and all bookkeeping pushed into private helpers.
//! Per-`(owner, repo)` serialization is enforced with a keyed mutex,
//! held for the duration of one entry point, rather than leaning on
//! the Store's own per-repo lock, which only guarantees that a single
//! Store call is atomic, not that a whole multi-call operation is.
//!
//! Every public method acquires the repo's lock and delegates to a
//! `*_locked` twin; the `*_locked` methods call each other directly
//! (never through the public wrappers) since `std::sync::Mutex` is not
//! reentrant.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::RepoConfig;
use crate::constructor::{AnyConstructor, ConstructError, MergeConstructor};
use crate::error::MergeQueueError;
use crate::forge::{CombinedStatus, ForgeClient, ForgeError};
use crate::ids::{CommitHash, IdGen, MergeAttemptId, PrId, RepoRef};
use crate::model::{AttemptState, MergeAttempt, PrState, PullRequest};
use crate::poller::{self, AttemptDue, PrDue};
use crate::readiness;
use crate::store::Store;

/// Why a PR is being cancelled. Affects only the comment
/// posted to the PR — the state-transition logic is identical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// An explicit cancel command.
    Command,
    /// A push to the PR's head branch invalidated its frozen
    /// `commit_hash`.
    HeadPushed,
    /// The poller purged a row whose state timeout elapsed: "all
    /// PR-level timeout purges are behaviorally identical to an explicit
    /// Cancel," just with a different comment.
    Timeout,
}

impl CancelReason {
    const fn comment(self) -> &'static str {
        match self {
            Self::Command => "Cancelled.",
            Self::HeadPushed => "Cancelled: the branch was pushed to after it entered the queue.",
            Self::Timeout => "Cancelled: timed out waiting in the merge queue.",
        }
    }
}

/// The merge-queue state machine. Generic over the persistence backend
/// and the forge client so tests can swap in fakes for both.
pub struct Controller<S, F> {
    store: S,
    forge: F,
    ids: IdGen,
    repo_locks: Mutex<HashMap<RepoRef, Arc<Mutex<()>>>>,
}

impl<S, F> Controller<S, F>
where
    S: Store,
    F: ForgeClient,
{
    /// Build a Controller over `store` and `forge`.
    pub fn new(store: S, forge: F) -> Self {
        Self { store, forge, ids: IdGen::new(), repo_locks: Mutex::new(HashMap::new()) }
    }

    fn repo_lock(&self, repo: &RepoRef) -> Arc<Mutex<()>> {
        let mut locks = self.repo_locks.lock().expect("repo_locks poisoned");
        locks.entry(repo.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    // -- public entry points -------------------------------------------------

    /// `Request`: a merge command was received for `pr`.
    ///
    /// # Errors
    /// Returns a user-facing [`MergeQueueError`] (already queued, closed,
    /// disallowed branch) synchronously; any transient Store/Forge error
    /// is also returned, but per the caller should simply log it and
    /// let the poller re-drive — no local retry.
    pub fn request(&self, pr: &PrId, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(&pr.repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.request_locked(pr, config, now)
    }

    /// `Initiate`: a review/status webhook suggests a
    /// `REQUESTED` PR may now be ready.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors; otherwise always `Ok`
    /// (no-op on any row that isn't `REQUESTED`).
    pub fn initiate(&self, pr: &PrId, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(&pr.repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.initiate_locked(pr, config, now)
    }

    /// `Construct`: try to admit a batch for `repo`.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors and [`ConstructError`]
    /// conflicts are handled internally (not surfaced as `Err`); a
    /// structural `Invariant` error indicates the Controller's own
    /// bookkeeping is wrong.
    pub fn construct(&self, repo: &RepoRef, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.construct_locked(repo, config, now)
    }

    /// `Test`: a CI status webhook reported on an attempt's
    /// staging commit.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors.
    pub fn test(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.test_locked(repo, attempt_id, config, now)
    }

    /// `Complete`: fast-forward the target branch for an
    /// attempt already in `SUCCESS`.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors.
    pub fn complete(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.complete_locked(repo, attempt_id, config, now)
    }

    /// `Cancel`: an explicit command, a push to a queued PR's
    /// branch, or a poller timeout purge.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors. Idempotent: cancelling a
    /// PR with no row is `Ok(())`.
    pub fn cancel(
        &self,
        pr: &PrId,
        reason: CancelReason,
        config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(&pr.repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.cancel_locked(pr, reason, config, now)
    }

    /// One poll tick over every PR and attempt row in `repo`.
    ///
    /// # Errors
    /// Propagates transient Store/Forge errors; a failure partway
    /// through leaves the remaining rows for the next tick.
    pub fn poll_repo(&self, repo: &RepoRef, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let lock = self.repo_lock(repo);
        let _guard = lock.lock().expect("repo lock poisoned");
        self.poll_repo_locked(repo, config, now)
    }

    // -- read-only lookups, used by the event router's SHA-disambiguation ---

    /// Find the PR in `repo` whose frozen `commit_hash` equals `commit`
    ///.
    ///
    /// # Errors
    /// Propagates transient Store errors.
    pub fn find_pr_by_head(&self, repo: &RepoRef, commit: &CommitHash) -> Result<Option<PrId>, MergeQueueError> {
        Ok(self
            .store
            .list_prs(repo)
            .map_err(store_err)?
            .into_iter()
            .find(|pr| &pr.commit_hash == commit)
            .map(|pr| pr.id()))
    }

    /// Find the MergeAttempt in `repo` whose staging commit equals
    /// `commit`. A staging commit can
    /// never equal a PR's frozen head, so callers should prefer this
    /// match over [`Self::find_pr_by_head`] when both could apply.
    ///
    /// # Errors
    /// Propagates transient Store errors.
    pub fn find_attempt_by_staging_sha(
        &self,
        repo: &RepoRef,
        commit: &CommitHash,
    ) -> Result<Option<MergeAttemptId>, MergeQueueError> {
        Ok(self
            .store
            .list_attempts(repo)
            .map_err(store_err)?
            .into_iter()
            .find(|a| a.staging_sha.as_ref() == Some(commit))
            .map(|a| a.id))
    }

    // -- locked implementations -----------------------------------------------

    fn request_locked(&self, pr_id: &PrId, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        if self.store.get_pr(&pr_id.repo, pr_id.number).map_err(store_err)?.is_some() {
            return Err(MergeQueueError::AlreadyQueued { pr: pr_id.clone() });
        }
        let info = self.forge.get_pull_request(pr_id).map_err(forge_err)?;
        if !info.open {
            return Err(MergeQueueError::PrClosed { pr: pr_id.clone() });
        }
        if !config.allowed_branches.iter().any(|b| b == &info.base_branch) {
            return Err(MergeQueueError::BranchNotAllowed { pr: pr_id.clone(), branch: info.base_branch.clone() });
        }

        let commit_hash = info.head_sha;
        let reviews = self.forge.list_reviews(pr_id).map_err(forge_err)?;
        let status = self.forge.combined_status(pr_id, &commit_hash).map_err(forge_err)?;
        let ready = readiness::evaluate(config, &info, &commit_hash, &reviews, status).is_ready();

        let row = PullRequest::new(pr_id.repo.clone(), pr_id.number, commit_hash, ready, now);
        self.store.put_pr(row).map_err(store_err)?;

        if ready {
            self.construct_locked(&pr_id.repo, config, now)?;
        }
        Ok(())
    }

    fn initiate_locked(&self, pr_id: &PrId, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let Some(mut row) = self.store.get_pr(&pr_id.repo, pr_id.number).map_err(store_err)? else {
            return Ok(());
        };
        if row.state != PrState::Requested {
            return Ok(());
        }

        let info = self.forge.get_pull_request(pr_id).map_err(forge_err)?;
        if info.head_sha != row.commit_hash {
            self.store.delete_pr(&pr_id.repo, pr_id.number).map_err(store_err)?;
            self.forge
                .post_comment(pr_id, "Head moved since this merge was requested; please re-request.")
                .map_err(forge_err)?;
            return Ok(());
        }

        let reviews = self.forge.list_reviews(pr_id).map_err(forge_err)?;
        let status = self.forge.combined_status(pr_id, &row.commit_hash).map_err(forge_err)?;
        let ready = readiness::evaluate(config, &info, &row.commit_hash, &reviews, status).is_ready();
        if ready {
            row.transition(PrState::Queued, now).map_err(invariant)?;
            self.store.put_pr(row).map_err(store_err)?;
            self.construct_locked(&pr_id.repo, config, now)?;
        }
        Ok(())
    }

    fn construct_locked(&self, repo: &RepoRef, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        let attempts = self.store.list_attempts(repo).map_err(store_err)?;
        if attempts.iter().any(|a| a.state.counts_against_single_flight()) {
            return Ok(()); // another attempt already in flight.
        }

        let mut attempt = match attempts.into_iter().find(|a| a.state == AttemptState::Split) {
            Some(split) => {
                if self.members_of(repo, &split.id)?.is_empty() {
                    self.store.delete_attempt(repo, &split.id).map_err(store_err)?;
                    return self.construct_locked(repo, config, now);
                }
                split
            }
            None => {
                let Some(bucket) = self.admit_bucket(repo, config, now)? else { return Ok(()) };
                let attempt = MergeAttempt::new(self.ids.next(), repo.clone(), now);
                self.store.put_attempt(attempt.clone()).map_err(store_err)?;
                for mut pr in bucket {
                    pr.merge_attempt = Some(attempt.id.clone());
                    pr.transition(PrState::Merging, now).map_err(invariant)?;
                    self.store.put_pr(pr).map_err(store_err)?;
                }
                attempt
            }
        };

        if attempt.state == AttemptState::Split {
            attempt.transition(AttemptState::Constructing, now).map_err(invariant)?;
            self.store.put_attempt(attempt.clone()).map_err(store_err)?;
            for mut pr in self.members_of(repo, &attempt.id)? {
                pr.transition(PrState::Merging, now).map_err(invariant)?;
                self.store.put_pr(pr).map_err(store_err)?;
            }
        }

        let batch = self.members_of(repo, &attempt.id)?;
        let target_branch = target_branch(config)?;
        let scope = batch.first().expect("just-admitted batch is never empty").id();

        let base_sha = self.forge.get_ref(&scope, target_branch).map_err(forge_err)?;
        attempt.base_sha = Some(base_sha);
        self.store.put_attempt(attempt.clone()).map_err(store_err)?;

        let prs: Vec<(PrId, CommitHash)> = batch.iter().map(|pr| (pr.id(), pr.commit_hash)).collect();
        let constructor = AnyConstructor::from_strategy(config.merge_strategy);
        match constructor.construct(&self.forge, &base_sha, &prs) {
            Ok(staging_sha) => self.finish_construction(repo, &attempt.id, &scope, staging_sha, now),
            Err(ConstructError::Conflict(conflicted)) => {
                self.handle_construct_conflict(repo, &attempt, &batch, &conflicted, now)
            }
            Err(ConstructError::Forge(e)) => Err(MergeQueueError::Forge(Box::new(e))),
        }
    }

    fn admit_bucket(
        &self,
        repo: &RepoRef,
        config: &RepoConfig,
        now: u64,
    ) -> Result<Option<Vec<PullRequest>>, MergeQueueError> {
        let queued: Vec<PullRequest> =
            self.store.list_prs(repo).map_err(store_err)?.into_iter().filter(|pr| pr.state == PrState::Queued).collect();
        if queued.is_empty() {
            return Ok(None);
        }
        let top_priority = queued.iter().map(|pr| pr.priority).max().expect("checked non-empty");
        let oldest = queued.iter().filter(|pr| pr.priority == top_priority).map(|pr| pr.timestamp).min().expect("checked non-empty");
        if now.saturating_sub(oldest) < config.timeouts.debounce_secs {
            return Ok(None); // debounce: give the bucket a chance to coalesce.
        }
        let mut bucket: Vec<PullRequest> = queued.into_iter().filter(|pr| pr.priority == top_priority).collect();
        bucket.sort_by_key(|pr| pr.number); // deterministic batch order; the Store makes no insertion-order guarantee.
        Ok(Some(bucket))
    }

    fn finish_construction(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        scope: &PrId,
        staging_sha: CommitHash,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        self.forge.force_update_ref(scope, &attempt_id.staging_ref_name(), &staging_sha).map_err(forge_err)?;

        let Some(mut attempt) = self.store.get_attempt(repo, attempt_id).map_err(store_err)? else {
            return Ok(()); // a concurrent Cancel already deleted it.
        };
        if attempt.state != AttemptState::Constructing {
            return Ok(()); // concurrent Cancel won the race; abandon this staging commit.
        }
        attempt.staging_sha = Some(staging_sha);
        attempt.transition(AttemptState::Testing, now).map_err(invariant)?;
        self.store.put_attempt(attempt).map_err(store_err)
    }

    fn handle_construct_conflict(
        &self,
        repo: &RepoRef,
        attempt: &MergeAttempt,
        batch: &[PullRequest],
        conflicted: &[PrId],
        now: u64,
    ) -> Result<(), MergeQueueError> {
        tracing::warn!(
            error = %MergeQueueError::MergeConflict { prs: conflicted.to_vec() },
            "construction conflict"
        );

        if batch.len() == 1 {
            let pr = &batch[0];
            self.forge.post_comment(&pr.id(), "Merge conflict; removed from the queue.").map_err(forge_err)?;
            self.store.delete_pr(repo, pr.number).map_err(store_err)?;
            self.store.delete_attempt(repo, &attempt.id).map_err(store_err)?;
            return Ok(());
        }

        let conflicting: HashSet<_> = conflicted.iter().map(|pr| pr.number).collect();

        let split_id = self.ids.next();
        let mut split = MergeAttempt::new(split_id.clone(), repo.clone(), now);
        split.transition(AttemptState::Split, now).map_err(invariant)?;
        self.store.put_attempt(split).map_err(store_err)?;

        for pr in batch {
            let mut pr = pr.clone();
            if conflicting.contains(&pr.number) {
                pr.merge_attempt = Some(split_id.clone());
                pr.transition(PrState::Split, now).map_err(invariant)?;
                self.forge
                    .post_comment(&pr.id(), "Merge conflict; split out of the batch for a retry.")
                    .map_err(forge_err)?;
            } else {
                pr.transition(PrState::Split, now).map_err(invariant)?;
            }
            self.store.put_pr(pr).map_err(store_err)?;
        }

        let mut demoted = attempt.clone();
        demoted.transition(AttemptState::Split, now).map_err(invariant)?;
        self.store.put_attempt(demoted).map_err(store_err)
    }

    fn test_locked(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let Some(attempt) = self.store.get_attempt(repo, attempt_id).map_err(store_err)? else {
            return Ok(());
        };
        if attempt.state != AttemptState::Testing {
            return Ok(());
        }
        let batch = self.members_of(repo, attempt_id)?;
        let Some(first) = batch.first() else {
            return Ok(()); // nothing left to test against; a poll tick will prune the row.
        };
        let staging_sha = attempt
            .staging_sha
            .ok_or_else(|| invariant(format!("attempt {attempt_id} is TESTING with no staging_sha")))?;

        let status = self.forge.combined_status(&first.id(), &staging_sha).map_err(forge_err)?;
        match status {
            CombinedStatus::Pending => Ok(()),
            CombinedStatus::Success => {
                let mut attempt = attempt;
                attempt.transition(AttemptState::Success, now).map_err(invariant)?;
                self.store.put_attempt(attempt).map_err(store_err)?;
                self.complete_locked(repo, attempt_id, config, now)
            }
            CombinedStatus::Failure => self.handle_test_failure(repo, &batch, &attempt, now),
        }
    }

    fn handle_test_failure(
        &self,
        repo: &RepoRef,
        batch: &[PullRequest],
        attempt: &MergeAttempt,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        tracing::warn!(
            error = %MergeQueueError::TestFailure { prs: batch.iter().map(PullRequest::id).collect() },
            "CI failure on staging commit"
        );

        if batch.len() == 1 {
            let pr = &batch[0];
            self.forge.post_comment(&pr.id(), "CI failed; removed from the queue.").map_err(forge_err)?;
            self.store.delete_pr(repo, pr.number).map_err(store_err)?;
            self.store.delete_attempt(repo, &attempt.id).map_err(store_err)?;
            return Ok(());
        }

        let mut ordered = batch.to_vec();
        ordered.sort_by_key(|pr| pr.number); // stable proxy for insertion order.
        let mid = ordered.len() / 2;

        for half in [&ordered[..mid], &ordered[mid..]] {
            let split_id = self.ids.next();
            let mut split = MergeAttempt::new(split_id.clone(), repo.clone(), now);
            split.transition(AttemptState::Split, now).map_err(invariant)?;
            self.store.put_attempt(split).map_err(store_err)?;
            for pr in half {
                let mut pr = pr.clone();
                pr.merge_attempt = Some(split_id.clone());
                pr.transition(PrState::Split, now).map_err(invariant)?;
                self.store.put_pr(pr).map_err(store_err)?;
            }
        }

        self.store.delete_attempt(repo, &attempt.id).map_err(store_err)
    }

    fn complete_locked(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let Some(attempt) = self.store.get_attempt(repo, attempt_id).map_err(store_err)? else {
            return Ok(());
        };
        if attempt.state != AttemptState::Success {
            return Ok(());
        }
        let batch = self.members_of(repo, attempt_id)?;
        let Some(first) = batch.first() else {
            self.store.delete_attempt(repo, attempt_id).map_err(store_err)?;
            return Ok(());
        };
        let staging_sha = attempt
            .staging_sha
            .ok_or_else(|| invariant(format!("attempt {attempt_id} is SUCCESS with no staging_sha")))?;
        let base_sha = attempt
            .base_sha
            .ok_or_else(|| invariant(format!("attempt {attempt_id} is SUCCESS with no base_sha")))?;
        let branch = target_branch(config)?;
        let scope = first.id();

        let applied = self.forge.compare_and_swap_ref(&scope, branch, &base_sha, &staging_sha).map_err(forge_err)?;
        if !applied {
            // Fast-forward race: someone pushed directly. Do not retry
            // with a different base; release the batch and let Construct
            // start over on the new tip.
            tracing::warn!(
                error = %MergeQueueError::FastForwardRace { attempt: attempt_id.clone() },
                "fast-forward rejected"
            );
            return self.reset_batch_to_queued(repo, &batch, attempt_id, now);
        }

        for pr in &batch {
            self.forge.post_comment(&pr.id(), "Merged.").map_err(forge_err)?;
            self.store.delete_pr(repo, pr.number).map_err(store_err)?;
        }
        self.store.delete_attempt(repo, attempt_id).map_err(store_err)?;
        self.construct_locked(repo, config, now)
    }

    fn reset_batch_to_queued(
        &self,
        repo: &RepoRef,
        batch: &[PullRequest],
        attempt_id: &MergeAttemptId,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        for pr in batch {
            let mut pr = pr.clone();
            pr.transition(PrState::Queued, now).map_err(invariant)?;
            pr.merge_attempt = None;
            self.store.put_pr(pr).map_err(store_err)?;
        }
        self.store.delete_attempt(repo, attempt_id).map_err(store_err)
    }

    fn cancel_locked(
        &self,
        pr_id: &PrId,
        reason: CancelReason,
        _config: &RepoConfig,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let Some(pr) = self.store.get_pr(&pr_id.repo, pr_id.number).map_err(store_err)? else {
            return Ok(()); // idempotent.
        };
        self.forge.post_comment(pr_id, reason.comment()).map_err(forge_err)?;

        match pr.state {
            PrState::Requested | PrState::Queued => {
                self.store.delete_pr(&pr_id.repo, pr_id.number).map_err(store_err)?;
            }
            PrState::Merging => {
                let attempt_id = pr
                    .merge_attempt
                    .clone()
                    .ok_or_else(|| invariant(format!("{pr_id} is MERGING with no merge_attempt")))?;
                self.store.delete_pr(&pr_id.repo, pr_id.number).map_err(store_err)?;
                self.demote_attempt_to_split(&pr_id.repo, &attempt_id, now)?;
            }
            PrState::Split => {
                let attempt_id = pr
                    .merge_attempt
                    .clone()
                    .ok_or_else(|| invariant(format!("{pr_id} is SPLIT with no merge_attempt")))?;
                self.store.delete_pr(&pr_id.repo, pr_id.number).map_err(store_err)?;
                self.prune_if_empty_split(&pr_id.repo, &attempt_id)?;
            }
        }
        Ok(())
    }

    fn demote_attempt_to_split(
        &self,
        repo: &RepoRef,
        attempt_id: &MergeAttemptId,
        now: u64,
    ) -> Result<(), MergeQueueError> {
        let Some(mut attempt) = self.store.get_attempt(repo, attempt_id).map_err(store_err)? else {
            return Ok(());
        };
        if attempt.state != AttemptState::Split {
            attempt.transition(AttemptState::Split, now).map_err(invariant)?;
            self.store.put_attempt(attempt).map_err(store_err)?;
        }
        for mut pr in self.members_of(repo, attempt_id)? {
            if pr.state != PrState::Split {
                pr.transition(PrState::Split, now).map_err(invariant)?;
                self.store.put_pr(pr).map_err(store_err)?;
            }
        }
        Ok(())
    }

    fn prune_if_empty_split(&self, repo: &RepoRef, attempt_id: &MergeAttemptId) -> Result<(), MergeQueueError> {
        let Some(attempt) = self.store.get_attempt(repo, attempt_id).map_err(store_err)? else {
            return Ok(());
        };
        if attempt.state == AttemptState::Split && self.members_of(repo, attempt_id)?.is_empty() {
            self.store.delete_attempt(repo, attempt_id).map_err(store_err)?;
        }
        Ok(())
    }

    fn poll_repo_locked(&self, repo: &RepoRef, config: &RepoConfig, now: u64) -> Result<(), MergeQueueError> {
        for pr in self.store.list_prs(repo).map_err(store_err)? {
            match poller::due_pr_action(&pr, config, now) {
                Some(PrDue::TimedOut) => self.cancel_locked(&pr.id(), CancelReason::Timeout, config, now)?,
                Some(PrDue::Initiate) => self.initiate_locked(&pr.id(), config, now)?,
                Some(PrDue::Construct) => self.construct_locked(repo, config, now)?,
                None => {}
            }
        }

        for attempt in self.store.list_attempts(repo).map_err(store_err)? {
            match poller::due_attempt_action(&attempt, config, now) {
                Some(AttemptDue::TimedOutConstructing | AttemptDue::TimedOutSuccess | AttemptDue::TimedOutSplit) => {
                    let batch = self.members_of(repo, &attempt.id)?;
                    self.reset_batch_to_queued(repo, &batch, &attempt.id, now)?;
                }
                Some(AttemptDue::TimedOutTesting) => {
                    let batch = self.members_of(repo, &attempt.id)?;
                    self.handle_test_failure(repo, &batch, &attempt, now)?;
                }
                Some(AttemptDue::Test) => self.test_locked(repo, &attempt.id, config, now)?,
                Some(AttemptDue::Complete) => self.complete_locked(repo, &attempt.id, config, now)?,
                Some(AttemptDue::Construct) => self.construct_locked(repo, config, now)?,
                None => {}
            }
        }
        Ok(())
    }

    fn members_of(&self, repo: &RepoRef, attempt_id: &MergeAttemptId) -> Result<Vec<PullRequest>, MergeQueueError> {
        Ok(self
            .store
            .list_prs(repo)
            .map_err(store_err)?
            .into_iter()
            .filter(|pr| pr.merge_attempt.as_ref() == Some(attempt_id))
            .collect())
    }
}

/// The one target branch a repo's merge queue lands onto. A `MergeAttempt`
/// is scoped only per-`(owner, repo)`, not per-branch, so this
/// Controller treats `allowed_branches`' first entry as that branch —
/// a repository wanting independently-queued branches needs one
/// `RepoConfig`/queue per branch, same as one per repository.
fn target_branch(config: &RepoConfig) -> Result<&str, MergeQueueError> {
    config
        .allowed_branches
        .first()
        .map(String::as_str)
        .ok_or_else(|| invariant("repository has no configured target branch"))
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> MergeQueueError {
    MergeQueueError::Store(Box::new(e))
}

fn forge_err(e: ForgeError) -> MergeQueueError {
    MergeQueueError::Forge(Box::new(e))
}

fn invariant(e: impl std::fmt::Display) -> MergeQueueError {
    MergeQueueError::Invariant(e.to_string())
}

impl<S, F> crate::events::ShaResolver for Controller<S, F>
where
    S: Store,
    F: ForgeClient,
{
    type Error = MergeQueueError;

    fn find_pr_by_head(&self, repo: &RepoRef, commit: &CommitHash) -> Result<Option<PrId>, Self::Error> {
        Self::find_pr_by_head(self, repo, commit)
    }

    fn find_attempt_by_staging_sha(
        &self,
        repo: &RepoRef,
        commit: &CommitHash,
    ) -> Result<Option<MergeAttemptId>, Self::Error> {
        Self::find_attempt_by_staging_sha(self, repo, commit)
    }
}
