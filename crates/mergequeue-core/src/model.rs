//! The data model: `PullRequest` and `MergeAttempt` rows, their state
//! enums, and the invariants a [`crate::store::Store`] must preserve
//! across every committed transaction.
//!
//! Small tagged-enum states with a `const fn valid_transitions` guard
//! table and a `can_transition_to` check, rather than method dispatch
//! on a class hierarchy: state machines as data, not classes.

use serde::{Deserialize, Serialize};

use crate::ids::{CommitHash, MergeAttemptId, Priority, RepoRef};

// ---------------------------------------------------------------------------
// PrState
// ---------------------------------------------------------------------------

/// The state of a [`PullRequest`] row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// Not ready yet; waiting on review, pre-status, or a re-request after
    /// its head moved.
    Requested,
    /// Ready and waiting for admission into a batch.
    Queued,
    /// Joined a batch; its commit is part of an in-flight MergeAttempt.
    Merging,
    /// Its attempt was bisected; waiting to be picked up by a smaller
    /// attempt.
    Split,
}

impl PrState {
    /// States in which a PR must carry a `merge_attempt` reference.
    #[must_use]
    pub const fn requires_attempt(self) -> bool {
        matches!(self, Self::Merging | Self::Split)
    }

    /// Legal destination states for this state, per the controller's
    /// transition table. `Cancel` (delete) is legal from every state and
    /// is modeled as row deletion rather than a `PrState` variant, so it
    /// is not listed here. `Merging`/`Split` → `Queued` is the
    /// poll-driven reset path (a fast-forward race, or a CONSTRUCTING/
    /// SUCCESS timeout): the PR is released back to the plain queue,
    /// abandoning its attempt lineage.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Requested => &[Self::Queued],
            Self::Queued => &[Self::Merging],
            Self::Merging => &[Self::Split, Self::Queued],
            Self::Split => &[Self::Merging, Self::Queued],
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Requested => "REQUESTED",
            Self::Queued => "QUEUED",
            Self::Merging => "MERGING",
            Self::Split => "SPLIT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// PullRequest
// ---------------------------------------------------------------------------

/// A row in the PR table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// The owning repository.
    pub repo: RepoRef,
    /// The PR number.
    pub number: crate::ids::PrNumber,
    /// The head commit the bot last observed and is reasoning about.
    ///
    /// Frozen once `state` leaves `Requested` — a new push while
    /// `Queued`/`Merging`/`Split` must go through `Cancel`, not a silent
    /// update of this field.
    pub commit_hash: CommitHash,
    /// Current lifecycle state.
    pub state: PrState,
    /// Set iff `state.requires_attempt()`.
    pub merge_attempt: Option<MergeAttemptId>,
    /// Epoch seconds of the last state transition.
    pub timestamp: u64,
    /// Admission priority bucket (bucketing key only; no cross-bucket
    /// interleaving, no resolver logic).
    pub priority: Priority,
}

impl PullRequest {
    /// Construct a freshly `Requested` or `Queued` row.
    #[must_use]
    pub fn new(
        repo: RepoRef,
        number: crate::ids::PrNumber,
        commit_hash: CommitHash,
        ready: bool,
        now: u64,
    ) -> Self {
        Self {
            repo,
            number,
            commit_hash,
            state: if ready { PrState::Queued } else { PrState::Requested },
            merge_attempt: None,
            timestamp: now,
            priority: Priority::default(),
        }
    }

    /// Apply a guarded state transition, stamping `timestamp`.
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] if `self.state` cannot reach `next`.
    pub fn transition(&mut self, next: PrState, now: u64) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        self.timestamp = now;
        Ok(())
    }

    /// This row's identity, for forge calls that are scoped by `PrId`.
    #[must_use]
    pub fn id(&self) -> crate::ids::PrId {
        crate::ids::PrId { repo: self.repo.clone(), number: self.number }
    }
}

/// Error returned by a guarded transition that violates the state
/// machine's transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    /// The state the transition started from.
    pub from: PrState,
    /// The state that was rejected.
    pub to: PrState,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

// ---------------------------------------------------------------------------
// AttemptState
// ---------------------------------------------------------------------------

/// The state of a [`MergeAttempt`] row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// The constructor is building the staging commit.
    Constructing,
    /// The staging commit is on the staging ref, awaiting CI.
    Testing,
    /// CI passed; awaiting fast-forward of the target branch.
    Success,
    /// Bisected: this attempt's PR set was produced by a split and is
    /// waiting to be picked up again by `Construct`.
    Split,
}

impl AttemptState {
    /// Legal destination states per the controller's state diagram, plus
    /// the `Success` → `Split` demotion path: a `Cancel` on a sibling
    /// `MERGING` PR can arrive after the attempt already reached
    /// `SUCCESS` but before `Complete`'s fast-forward ran — the staging
    /// commit no longer reflects the surviving PR set, so the attempt is
    /// demoted
    /// the same way a `CONSTRUCTING`/`TESTING` attempt would be. Row
    /// deletion (the rest of `Cancel`'s behavior) is legal from every
    /// state and is not listed here.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Constructing => &[Self::Testing, Self::Split],
            Self::Testing => &[Self::Success, Self::Split],
            Self::Success => &[Self::Split],
            Self::Split => &[Self::Constructing],
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// States counted toward "at most one non-SPLIT attempt per repo."
    #[must_use]
    pub const fn counts_against_single_flight(self) -> bool {
        !matches!(self, Self::Split)
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Constructing => "CONSTRUCTING",
            Self::Testing => "TESTING",
            Self::Success => "SUCCESS",
            Self::Split => "SPLIT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// MergeAttempt
// ---------------------------------------------------------------------------

/// A row in the MergeAttempt table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeAttempt {
    /// Opaque, globally unique id. The staging branch name is derived from
    /// this (see [`MergeAttemptId::staging_ref_name`]).
    pub id: MergeAttemptId,
    /// The repository this attempt belongs to.
    pub repo: RepoRef,
    /// Current lifecycle state.
    pub state: AttemptState,
    /// Epoch seconds of the last state transition.
    pub timestamp: u64,
    /// The target-branch tip read before construction began. `Complete`'s
    /// fast-forward requires the target branch's current tip to still
    /// equal this value. `None` until the attempt has read the tip at
    /// least once (e.g. a freshly adopted `SPLIT` attempt that hasn't
    /// re-entered `Construct` yet).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<CommitHash>,
    /// The staging commit the constructor produced, set when the attempt
    /// advances `Constructing` → `Testing`. `Test` and `Complete` both
    /// read this rather than re-deriving it: the commit fast-forwarded
    /// to is exactly the one CI reported green on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_sha: Option<CommitHash>,
}

impl MergeAttempt {
    /// Construct a new attempt in `Constructing`.
    #[must_use]
    pub fn new(id: MergeAttemptId, repo: RepoRef, now: u64) -> Self {
        Self {
            id,
            repo,
            state: AttemptState::Constructing,
            timestamp: now,
            base_sha: None,
            staging_sha: None,
        }
    }

    /// Apply a guarded state transition, stamping `timestamp`.
    ///
    /// # Errors
    /// Returns [`InvalidAttemptTransition`] if `self.state` cannot reach
    /// `next`.
    pub fn transition(&mut self, next: AttemptState, now: u64) -> Result<(), InvalidAttemptTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidAttemptTransition { from: self.state, to: next });
        }
        self.state = next;
        self.timestamp = now;
        Ok(())
    }
}

/// Error returned by a guarded attempt transition that violates the state
/// machine's transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidAttemptTransition {
    /// The state the transition started from.
    pub from: AttemptState,
    /// The state that was rejected.
    pub to: AttemptState,
}

impl std::fmt::Display for InvalidAttemptTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidAttemptTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Owner, PrNumber, RepoName};

    fn repo() -> RepoRef {
        RepoRef { owner: Owner::new("acme").unwrap(), repo: RepoName::new("widgets").unwrap() }
    }

    fn hash(byte: char) -> CommitHash {
        CommitHash::new(byte.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn pr_state_display() {
        assert_eq!(PrState::Requested.to_string(), "REQUESTED");
        assert_eq!(PrState::Queued.to_string(), "QUEUED");
        assert_eq!(PrState::Merging.to_string(), "MERGING");
        assert_eq!(PrState::Split.to_string(), "SPLIT");
    }

    #[test]
    fn pr_state_requires_attempt() {
        assert!(!PrState::Requested.requires_attempt());
        assert!(!PrState::Queued.requires_attempt());
        assert!(PrState::Merging.requires_attempt());
        assert!(PrState::Split.requires_attempt());
    }

    #[test]
    fn pr_state_valid_transitions() {
        assert!(PrState::Requested.can_transition_to(PrState::Queued));
        assert!(!PrState::Requested.can_transition_to(PrState::Merging));
        assert!(PrState::Queued.can_transition_to(PrState::Merging));
        assert!(!PrState::Queued.can_transition_to(PrState::Split));
        assert!(PrState::Merging.can_transition_to(PrState::Split));
        assert!(PrState::Merging.can_transition_to(PrState::Queued));
        assert!(PrState::Split.can_transition_to(PrState::Merging));
        assert!(PrState::Split.can_transition_to(PrState::Queued));
    }

    #[test]
    fn pr_transition_stamps_timestamp_and_rejects_illegal() {
        let mut pr = PullRequest::new(repo(), PrNumber(1), hash('a'), false, 100);
        assert_eq!(pr.state, PrState::Requested);
        pr.transition(PrState::Queued, 200).unwrap();
        assert_eq!(pr.state, PrState::Queued);
        assert_eq!(pr.timestamp, 200);
        let err = pr.transition(PrState::Split, 300).unwrap_err();
        assert_eq!(err.from, PrState::Queued);
        assert_eq!(err.to, PrState::Split);
        assert_eq!(pr.state, PrState::Queued, "rejected transition must not mutate state");
    }

    #[test]
    fn attempt_state_display() {
        assert_eq!(AttemptState::Constructing.to_string(), "CONSTRUCTING");
        assert_eq!(AttemptState::Testing.to_string(), "TESTING");
        assert_eq!(AttemptState::Success.to_string(), "SUCCESS");
        assert_eq!(AttemptState::Split.to_string(), "SPLIT");
    }

    #[test]
    fn attempt_state_valid_transitions() {
        assert!(AttemptState::Constructing.can_transition_to(AttemptState::Testing));
        assert!(AttemptState::Constructing.can_transition_to(AttemptState::Split));
        assert!(AttemptState::Testing.can_transition_to(AttemptState::Success));
        assert!(AttemptState::Testing.can_transition_to(AttemptState::Split));
        assert!(!AttemptState::Success.can_transition_to(AttemptState::Testing));
        assert!(AttemptState::Split.can_transition_to(AttemptState::Constructing));
    }

    #[test]
    fn attempt_state_success_can_only_demote_to_split() {
        assert_eq!(AttemptState::Success.valid_transitions(), &[AttemptState::Split]);
        assert!(!AttemptState::Success.can_transition_to(AttemptState::Testing));
        assert!(!AttemptState::Success.can_transition_to(AttemptState::Constructing));
    }

    #[test]
    fn attempt_state_single_flight_accounting() {
        assert!(AttemptState::Constructing.counts_against_single_flight());
        assert!(AttemptState::Testing.counts_against_single_flight());
        assert!(AttemptState::Success.counts_against_single_flight());
        assert!(!AttemptState::Split.counts_against_single_flight());
    }

    #[test]
    fn attempt_transition_rejects_illegal() {
        let mut attempt = MergeAttempt::new(MergeAttemptId::new("x1").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Testing, 1).unwrap();
        attempt.transition(AttemptState::Success, 2).unwrap();
        let err = attempt.transition(AttemptState::Testing, 3).unwrap_err();
        assert_eq!(err.from, AttemptState::Success);
        assert_eq!(err.to, AttemptState::Testing);
    }

    #[test]
    fn pr_serde_roundtrip() {
        let pr = PullRequest::new(repo(), PrNumber(9), hash('f'), true, 42);
        let json = serde_json::to_string(&pr).unwrap();
        let back: PullRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(pr, back);
    }

    #[test]
    fn pr_state_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&PrState::Merging).unwrap(), "\"merging\"");
    }
}
