//! The poller: iterated periodically by `mergequeue-cli`'s
//! `serve` loop, at `config.timeouts.poll_period_secs`.
//!
//! Rather than a poll loop that talks to the store itself, this module
//! is kept pure: given one row and the current time, it answers "what,
//! if anything, is due." [`crate::controller::Controller::poll_repo`] is
//! the impure half that fetches rows and drives the Controller's
//! locked entry points from these answers.

use crate::config::RepoConfig;
use crate::model::{AttemptState, MergeAttempt, PrState, PullRequest};

/// What a PR row's poll tick should do, if anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrDue {
    /// The row's state timeout has elapsed; treat like an explicit
    /// `Cancel`.
    TimedOut,
    /// `REQUESTED`: re-evaluate readiness (recovers from a missed
    /// webhook).
    Initiate,
    /// `QUEUED`/`SPLIT`: try to admit a new batch.
    Construct,
}

/// Compute the due action for one PR row, or `None` if nothing is due
/// yet. `MERGING` rows are driven by their attempt's own poll action,
/// not polled directly, except for the timeout safety net.
#[must_use]
pub fn due_pr_action(pr: &PullRequest, config: &RepoConfig, now: u64) -> Option<PrDue> {
    let age = now.saturating_sub(pr.timestamp);
    let timeout = match pr.state {
        PrState::Requested => config.timeouts.requested_secs,
        PrState::Queued => config.timeouts.queued_secs,
        PrState::Merging => config.timeouts.merging_secs,
        PrState::Split => config.timeouts.split_secs,
    };
    if age >= timeout {
        return Some(PrDue::TimedOut);
    }
    match pr.state {
        PrState::Requested => Some(PrDue::Initiate),
        PrState::Queued | PrState::Split => Some(PrDue::Construct),
        PrState::Merging => None,
    }
}

/// What a MergeAttempt row's poll tick should do, if anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptDue {
    /// `CONSTRUCTING` never finished; reset the batch to `QUEUED`
    /// rather than guess which PR was at fault.
    TimedOutConstructing,
    /// `TESTING` never got a result; treat like a CI failure, since the batch's correctness is unverified.
    TimedOutTesting,
    /// `SUCCESS` never fast-forwarded; reset the batch to `QUEUED` as a
    /// safety net (normally `Complete`'s own retry-on-poll resolves
    /// this long before the timeout fires).
    TimedOutSuccess,
    /// A `SPLIT` attempt sat unpicked for a full day; release its PRs
    /// back to plain `QUEUED` rather than let it wait indefinitely.
    TimedOutSplit,
    /// `TESTING`, not timed out: re-read combined status.
    Test,
    /// `SUCCESS`, not timed out: retry the fast-forward (crash
    /// recovery).
    Complete,
    /// `SPLIT`, not timed out: try to resume it via `Construct`.
    Construct,
}

/// Compute the due action for one MergeAttempt row, or `None`.
#[must_use]
pub fn due_attempt_action(attempt: &MergeAttempt, config: &RepoConfig, now: u64) -> Option<AttemptDue> {
    let age = now.saturating_sub(attempt.timestamp);
    match attempt.state {
        AttemptState::Constructing if age >= config.timeouts.constructing_secs => {
            Some(AttemptDue::TimedOutConstructing)
        }
        AttemptState::Constructing => None,
        AttemptState::Testing if age >= config.timeouts.testing_secs => Some(AttemptDue::TimedOutTesting),
        AttemptState::Testing => Some(AttemptDue::Test),
        AttemptState::Success if age >= config.timeouts.success_secs => Some(AttemptDue::TimedOutSuccess),
        AttemptState::Success => Some(AttemptDue::Complete),
        AttemptState::Split if age >= config.timeouts.split_secs => Some(AttemptDue::TimedOutSplit),
        AttemptState::Split => Some(AttemptDue::Construct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CommitHash, Owner, PrNumber, RepoName, RepoRef};

    fn repo() -> RepoRef {
        RepoRef { owner: Owner::new("acme").unwrap(), repo: RepoName::new("widgets").unwrap() }
    }

    fn hash() -> CommitHash {
        CommitHash::new("a".repeat(40)).unwrap()
    }

    #[test]
    fn requested_row_not_timed_out_triggers_initiate() {
        let pr = PullRequest::new(repo(), PrNumber(1), hash(), false, 100);
        let action = due_pr_action(&pr, &RepoConfig::default(), 200);
        assert_eq!(action, Some(PrDue::Initiate));
    }

    #[test]
    fn requested_row_past_timeout_is_timed_out() {
        let pr = PullRequest::new(repo(), PrNumber(1), hash(), false, 0);
        let config = RepoConfig::default();
        let action = due_pr_action(&pr, &config, config.timeouts.requested_secs);
        assert_eq!(action, Some(PrDue::TimedOut));
    }

    #[test]
    fn queued_row_triggers_construct() {
        let pr = PullRequest::new(repo(), PrNumber(1), hash(), true, 100);
        let action = due_pr_action(&pr, &RepoConfig::default(), 200);
        assert_eq!(action, Some(PrDue::Construct));
    }

    #[test]
    fn merging_row_not_due_unless_timed_out() {
        let mut pr = PullRequest::new(repo(), PrNumber(1), hash(), true, 0);
        pr.transition(PrState::Merging, 0).unwrap();
        assert_eq!(due_pr_action(&pr, &RepoConfig::default(), 10), None);
        let config = RepoConfig::default();
        let action = due_pr_action(&pr, &config, config.timeouts.merging_secs);
        assert_eq!(action, Some(PrDue::TimedOut));
    }

    #[test]
    fn constructing_attempt_not_due_until_timeout() {
        let attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        assert_eq!(due_attempt_action(&attempt, &RepoConfig::default(), 10), None);
        let config = RepoConfig::default();
        let action = due_attempt_action(&attempt, &config, config.timeouts.constructing_secs);
        assert_eq!(action, Some(AttemptDue::TimedOutConstructing));
    }

    #[test]
    fn testing_attempt_triggers_test_before_timeout() {
        let mut attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Testing, 0).unwrap();
        assert_eq!(due_attempt_action(&attempt, &RepoConfig::default(), 10), Some(AttemptDue::Test));
    }

    #[test]
    fn testing_attempt_past_timeout_is_timed_out() {
        let mut attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Testing, 0).unwrap();
        let config = RepoConfig::default();
        let action = due_attempt_action(&attempt, &config, config.timeouts.testing_secs);
        assert_eq!(action, Some(AttemptDue::TimedOutTesting));
    }

    #[test]
    fn success_attempt_triggers_complete_before_timeout() {
        let mut attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Testing, 0).unwrap();
        attempt.transition(AttemptState::Success, 0).unwrap();
        assert_eq!(due_attempt_action(&attempt, &RepoConfig::default(), 10), Some(AttemptDue::Complete));
    }

    #[test]
    fn split_attempt_triggers_construct_before_timeout() {
        let mut attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Split, 0).unwrap();
        assert_eq!(due_attempt_action(&attempt, &RepoConfig::default(), 10), Some(AttemptDue::Construct));
    }

    #[test]
    fn split_attempt_past_timeout_is_timed_out() {
        let mut attempt = MergeAttempt::new(crate::ids::MergeAttemptId::new("a").unwrap(), repo(), 0);
        attempt.transition(AttemptState::Split, 0).unwrap();
        let config = RepoConfig::default();
        let action = due_attempt_action(&attempt, &config, config.timeouts.split_secs);
        assert_eq!(action, Some(AttemptDue::TimedOutSplit));
    }
}
