//! The event router: normalizes the forge's
//! webhook payloads — whose signature verification and parsing are out
//! of scope — into calls on the [`crate::controller::Controller`].
//!
//! Kept a pure normalization layer, the same split the poller uses
//! between "what is due" and "who drives it": [`route`] only
//! decides *which* [`ControllerCall`]s an [`InboundEvent`] implies; the
//! caller (the out-of-scope webhook receiver, or the CLI's demo runner)
//! is the one that actually invokes the Controller with them.
//!
//! The one place routing needs more than the event's own fields is
//! status reports: a commit can be either a PR's
//! frozen head (pre-status, routes to `Initiate`) or an attempt's
//! staging commit (CI-on-staging, routes to `Test`). [`ShaResolver`]
//! captures exactly the two lookups [`route`] needs to tell them apart,
//! so this module never has to import `Store`/`ForgeClient` directly.

use crate::controller::CancelReason;
use crate::ids::{CommitHash, MergeAttemptId, PrId, RepoRef};

/// What kind of `pull_request` webhook action occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrChangeKind {
    /// The PR was opened.
    Opened,
    /// The PR was reopened after being closed.
    Reopened,
    /// The PR was closed (merged or abandoned).
    Closed,
    /// The PR's head branch was pushed to (new commits).
    Synchronize,
}

/// A bot command parsed from a comment or review body. Parsing the literal command syntax against
/// `RepoConfig::command_prefix` is the webhook receiver's job; by the
/// time an event reaches this router the command is already
/// recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    /// Request a merge (e.g. `bors r+`).
    Request,
    /// Cancel a pending merge (e.g. `bors r-`).
    Cancel,
}

/// A normalized inbound signal, ready to be routed to
/// one or more Controller entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// `pull_request` (opened/closed/reopened/synchronize).
    PullRequestChanged {
        /// The PR the webhook concerns.
        pr: PrId,
        /// The webhook action.
        kind: PrChangeKind,
    },
    /// `issue_comment` / `pull_request_review`: a bot command, an
    /// approval, or a plain comment/review with no recognized command.
    CommentOrReview {
        /// The PR the comment or review was posted on.
        pr: PrId,
        /// The recognized command, if any. `None` covers a review
        /// submission with no command body — still routed to
        /// `Initiate` since an approval may have just landed.
        command: Option<BotCommand>,
    },
    /// `status` / `check_suite` / `check_run`: some commit's combined
    /// status changed. Disambiguated against PR heads and attempt
    /// staging commits by [`route`] via [`ShaResolver`].
    StatusReport {
        /// The repository the status was reported against.
        repo: RepoRef,
        /// The commit the status was reported at.
        commit: CommitHash,
    },
    /// `push`: a push landed on `pr`'s head branch, invalidating its
    /// frozen `commit_hash` if queued. Matching the pushed ref
    /// to the PR it belongs to is the webhook receiver's job (it has
    /// the forge's branch↔PR mapping); by the time this event exists,
    /// that resolution has already happened.
    Push {
        /// The PR whose head branch was pushed to.
        pr: PrId,
    },
    /// An explicit bot command, received out-of-band from a comment
    /// (e.g. a slash-command UI, or a re-delivered webhook already
    /// classified upstream).
    Command {
        /// The PR the command targets.
        pr: PrId,
        /// The command.
        command: BotCommand,
    },
    /// A poller tick for one repository.
    PollTick {
        /// The repository to poll.
        repo: RepoRef,
    },
}

/// One Controller entry point to invoke, with the arguments [`route`]
/// determined from an [`InboundEvent`]. Carries no `Store`/`ForgeClient`
/// generics, so it can be returned from a pure function and dispatched
/// later by whatever owns the Controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerCall {
    /// Request a merge for this PR.
    Request(PrId),
    /// Re-evaluate readiness for this PR at its current head.
    Initiate(PrId),
    /// Try to admit a batch, scoped by repository (not by PR — admission
    /// considers every `QUEUED` PR in the repo at once).
    Construct(RepoRef),
    /// A status report landed on this attempt's staging commit.
    Test(RepoRef, MergeAttemptId),
    /// Cancel this PR's in-flight merge attempt, if any.
    Cancel(PrId, CancelReason),
    /// One poller tick over every row in a repository.
    PollRepo(RepoRef),
}

/// The two lookups [`route`] needs to disambiguate a `StatusReport` by
/// commit SHA. Implemented by
/// [`Controller`](crate::controller::Controller) via direct delegation
/// to its own read-only lookups.
pub trait ShaResolver {
    /// The error type of a failed lookup (propagated, never swallowed,
    /// since losing a status report silently would desync queue state
    /// from what CI actually reported).
    type Error: std::error::Error + Send + Sync + 'static;

    /// See [`crate::controller::Controller::find_pr_by_head`].
    fn find_pr_by_head(&self, repo: &RepoRef, commit: &CommitHash) -> Result<Option<PrId>, Self::Error>;

    /// See [`crate::controller::Controller::find_attempt_by_staging_sha`].
    fn find_attempt_by_staging_sha(
        &self,
        repo: &RepoRef,
        commit: &CommitHash,
    ) -> Result<Option<MergeAttemptId>, Self::Error>;
}

/// Normalize `event` into the Controller calls it implies.
///
/// A staging commit can never equal a PR's frozen head, so a
/// `StatusReport` that resolves to an attempt always routes to `Test`
/// in preference to `Initiate`.
/// An event that resolves to nothing due (e.g. a status report on a
/// commit the Controller has no record of — most commits in a
/// repository are neither a queued PR's head nor a staging commit)
/// routes to no calls at all; this is expected, not an error.
///
/// # Errors
/// Propagates a lookup failure from `resolver` for `StatusReport`
/// events; every other variant is a pure mapping and cannot fail.
pub fn route<R: ShaResolver>(event: &InboundEvent, resolver: &R) -> Result<Vec<ControllerCall>, R::Error> {
    Ok(match event {
        InboundEvent::PullRequestChanged { pr, kind } => match kind {
            PrChangeKind::Opened | PrChangeKind::Reopened => vec![ControllerCall::Initiate(pr.clone())],
            PrChangeKind::Closed => vec![ControllerCall::Cancel(pr.clone(), CancelReason::Command)],
            PrChangeKind::Synchronize => vec![ControllerCall::Cancel(pr.clone(), CancelReason::HeadPushed)],
        },
        InboundEvent::CommentOrReview { pr, command } => match command {
            Some(BotCommand::Request) => vec![ControllerCall::Request(pr.clone())],
            Some(BotCommand::Cancel) => vec![ControllerCall::Cancel(pr.clone(), CancelReason::Command)],
            None => vec![ControllerCall::Initiate(pr.clone())],
        },
        InboundEvent::StatusReport { repo, commit } => {
            if let Some(attempt_id) = resolver.find_attempt_by_staging_sha(repo, commit)? {
                vec![ControllerCall::Test(repo.clone(), attempt_id)]
            } else if let Some(pr) = resolver.find_pr_by_head(repo, commit)? {
                vec![ControllerCall::Initiate(pr)]
            } else {
                Vec::new()
            }
        }
        InboundEvent::Push { pr } => vec![ControllerCall::Cancel(pr.clone(), CancelReason::HeadPushed)],
        InboundEvent::Command { pr, command } => match command {
            BotCommand::Request => vec![ControllerCall::Request(pr.clone())],
            BotCommand::Cancel => vec![ControllerCall::Cancel(pr.clone(), CancelReason::Command)],
        },
        InboundEvent::PollTick { repo } => vec![ControllerCall::PollRepo(repo.clone())],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Owner, PrNumber, RepoName};

    fn repo() -> RepoRef {
        RepoRef { owner: Owner::new("acme").unwrap(), repo: RepoName::new("widgets").unwrap() }
    }

    fn pr(n: u64) -> PrId {
        PrId { repo: repo(), number: PrNumber(n) }
    }

    fn hash(c: char) -> CommitHash {
        CommitHash::new(c.to_string().repeat(40)).unwrap()
    }

    #[derive(Debug)]
    struct NeverFails;
    impl std::fmt::Display for NeverFails {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("never fails")
        }
    }
    impl std::error::Error for NeverFails {}

    struct StubResolver {
        pr_head: Option<PrId>,
        attempt_staging: Option<MergeAttemptId>,
    }

    impl ShaResolver for StubResolver {
        type Error = NeverFails;
        fn find_pr_by_head(&self, _repo: &RepoRef, _commit: &CommitHash) -> Result<Option<PrId>, Self::Error> {
            Ok(self.pr_head.clone())
        }
        fn find_attempt_by_staging_sha(
            &self,
            _repo: &RepoRef,
            _commit: &CommitHash,
        ) -> Result<Option<MergeAttemptId>, Self::Error> {
            Ok(self.attempt_staging.clone())
        }
    }

    #[test]
    fn opened_routes_to_initiate() {
        let event = InboundEvent::PullRequestChanged { pr: pr(1), kind: PrChangeKind::Opened };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Initiate(pr(1))]);
    }

    #[test]
    fn closed_routes_to_cancel() {
        let event = InboundEvent::PullRequestChanged { pr: pr(1), kind: PrChangeKind::Closed };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Cancel(pr(1), CancelReason::Command)]);
    }

    #[test]
    fn synchronize_routes_to_cancel_with_head_pushed_reason() {
        let event = InboundEvent::PullRequestChanged { pr: pr(1), kind: PrChangeKind::Synchronize };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Cancel(pr(1), CancelReason::HeadPushed)]);
    }

    #[test]
    fn comment_with_request_command_routes_to_request() {
        let event = InboundEvent::CommentOrReview { pr: pr(1), command: Some(BotCommand::Request) };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Request(pr(1))]);
    }

    #[test]
    fn review_with_no_command_routes_to_initiate() {
        let event = InboundEvent::CommentOrReview { pr: pr(1), command: None };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Initiate(pr(1))]);
    }

    #[test]
    fn status_report_prefers_attempt_match_over_pr_match() {
        let event = InboundEvent::StatusReport { repo: repo(), commit: hash('a') };
        let resolver =
            StubResolver { pr_head: Some(pr(1)), attempt_staging: Some(MergeAttemptId::new("x1").unwrap()) };
        assert_eq!(
            route(&event, &resolver).unwrap(),
            vec![ControllerCall::Test(repo(), MergeAttemptId::new("x1").unwrap())]
        );
    }

    #[test]
    fn status_report_falls_back_to_pr_match() {
        let event = InboundEvent::StatusReport { repo: repo(), commit: hash('a') };
        let resolver = StubResolver { pr_head: Some(pr(1)), attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Initiate(pr(1))]);
    }

    #[test]
    fn status_report_on_unknown_commit_routes_nowhere() {
        let event = InboundEvent::StatusReport { repo: repo(), commit: hash('a') };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), Vec::new());
    }

    #[test]
    fn push_routes_to_cancel_with_head_pushed_reason() {
        let event = InboundEvent::Push { pr: pr(3) };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::Cancel(pr(3), CancelReason::HeadPushed)]);
    }

    #[test]
    fn poll_tick_routes_to_poll_repo() {
        let event = InboundEvent::PollTick { repo: repo() };
        let resolver = StubResolver { pr_head: None, attempt_staging: None };
        assert_eq!(route(&event, &resolver).unwrap(), vec![ControllerCall::PollRepo(repo())]);
    }
}
