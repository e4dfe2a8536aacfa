//! `mergequeue demo`/`poll-once`/`serve`/`status`: drive the Controller
//! over a seeded in-memory queue so a config file's timeouts and
//! strategy can be sanity-checked without a live repository.
//!
//! [`SyntheticForge`] is this crate's analogue of
//! `mergequeue_core::controller`'s test-only `FakeForge`: every PR is
//! pre-approved and every commit's combined status is `Success`, so the
//! only thing actually under test is the Controller/poller's own
//! admission and timeout behavior against the loaded `RepoConfig`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use mergequeue_core::config::RepoConfig;
use mergequeue_core::controller::Controller;
use mergequeue_core::forge::{
    CombinedStatus, CompareCommit, ForgeClient, ForgeError, PullRequestInfo, Review, ReviewState,
};
use mergequeue_core::ids::{CommitHash, Owner, PrId, PrNumber, RepoName, RepoRef};
use mergequeue_core::model::{AttemptState, PrState};
use mergequeue_core::store::{InMemoryStore, Store};

const DEMO_PR_COUNT: u64 = 3;

fn demo_repo() -> RepoRef {
    RepoRef {
        owner: Owner::new("demo").expect("\"demo\" is a valid owner name"),
        repo: RepoName::new("queue").expect("\"queue\" is a valid repo name"),
    }
}

fn demo_hash(seed: u8) -> CommitHash {
    CommitHash::new(format!("{seed:02x}").repeat(20)).expect("40 hex chars is always a valid CommitHash")
}

/// A forge double that approves every PR and greenlights every status
/// check, deterministically synthesizing a new commit hash for every
/// merge/construct call so the demo queue actually drains.
struct SyntheticForge {
    refs: Mutex<std::collections::HashMap<String, CommitHash>>,
}

impl SyntheticForge {
    fn new(base: CommitHash) -> Self {
        let mut refs = std::collections::HashMap::new();
        refs.insert("main".to_owned(), base);
        Self { refs: Mutex::new(refs) }
    }

    fn synthesize(a: &CommitHash, b: &CommitHash) -> CommitHash {
        let sum: u32 =
            a.as_str().bytes().map(u32::from).sum::<u32>() + b.as_str().bytes().map(u32::from).sum::<u32>();
        CommitHash::new(format!("{:02x}", sum % 256).repeat(20)).expect("40 hex chars is always a valid CommitHash")
    }
}

impl ForgeClient for SyntheticForge {
    fn get_pull_request(&self, pr: &PrId) -> Result<PullRequestInfo, ForgeError> {
        Ok(PullRequestInfo {
            open: true,
            draft: false,
            base_branch: "main".to_owned(),
            head_sha: demo_hash(u8::try_from(pr.number.0).unwrap_or(u8::MAX)),
        })
    }

    fn list_reviews(&self, pr: &PrId) -> Result<Vec<Review>, ForgeError> {
        let head = demo_hash(u8::try_from(pr.number.0).unwrap_or(u8::MAX));
        Ok(vec![Review { reviewer: "demo-reviewer".to_owned(), commit_id: head, state: ReviewState::Approved, submitted_at: 0 }])
    }

    fn combined_status(&self, _pr: &PrId, _commit: &CommitHash) -> Result<CombinedStatus, ForgeError> {
        Ok(CombinedStatus::Success)
    }

    fn get_ref(&self, _pr: &PrId, ref_name: &str) -> Result<CommitHash, ForgeError> {
        self.refs
            .lock()
            .expect("refs mutex poisoned")
            .get(ref_name)
            .copied()
            .ok_or_else(|| ForgeError(format!("no such ref: {ref_name}").into()))
    }

    fn force_update_ref(&self, _pr: &PrId, ref_name: &str, sha: &CommitHash) -> Result<(), ForgeError> {
        self.refs.lock().expect("refs mutex poisoned").insert(ref_name.to_owned(), *sha);
        Ok(())
    }

    fn compare_and_swap_ref(
        &self,
        _pr: &PrId,
        ref_name: &str,
        expected_current: &CommitHash,
        new_sha: &CommitHash,
    ) -> Result<bool, ForgeError> {
        let mut refs = self.refs.lock().expect("refs mutex poisoned");
        if refs.get(ref_name) == Some(expected_current) {
            refs.insert(ref_name.to_owned(), *new_sha);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn create_merge_commit(&self, _pr: &PrId, base: &CommitHash, head: &CommitHash) -> Result<Option<CommitHash>, ForgeError> {
        Ok(Some(Self::synthesize(base, head)))
    }

    fn create_commit(
        &self,
        _pr: &PrId,
        tree_from: &CommitHash,
        parents: &[CommitHash],
        _message: &str,
    ) -> Result<CommitHash, ForgeError> {
        Ok(Self::synthesize(tree_from, parents.first().unwrap_or(tree_from)))
    }

    fn compare_commits(&self, _pr: &PrId, _base: &CommitHash, _head: &CommitHash) -> Result<Vec<CompareCommit>, ForgeError> {
        Ok(Vec::new())
    }

    fn post_comment(&self, pr: &PrId, body: &str) -> Result<(), ForgeError> {
        println!("  comment on {pr}: {body}");
        Ok(())
    }
}

fn load_config(path: &Path) -> Result<RepoConfig> {
    RepoConfig::load(path).map_err(|e| anyhow::anyhow!("{e}"))
}

fn seeded_controller(config: &RepoConfig) -> (Arc<InMemoryStore>, Controller<Arc<InMemoryStore>, Arc<SyntheticForge>>) {
    let store = Arc::new(InMemoryStore::new());
    let base = demo_hash(0);
    let forge = Arc::new(SyntheticForge::new(base));
    let controller = Controller::new(store.clone(), forge);
    let repo = demo_repo();
    for n in 1..=DEMO_PR_COUNT {
        let pr = PrId { repo: repo.clone(), number: PrNumber(n) };
        controller.request(&pr, config, 0).expect("seeding a fresh demo PR never fails");
    }
    (store, controller)
}

fn print_queue(store: &InMemoryStore, repo: &RepoRef) {
    let mut prs = store.list_prs(repo).unwrap_or_default();
    prs.sort_by_key(|pr| pr.number);
    println!("PRs:");
    for pr in &prs {
        let attempt = pr.merge_attempt.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_owned());
        println!("  #{:<3} {:<10} attempt={}", pr.number.0, pr.state.to_string(), attempt);
    }

    let mut attempts = store.list_attempts(repo).unwrap_or_default();
    attempts.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    println!("Attempts:");
    if attempts.is_empty() {
        println!("  (none)");
    }
    for attempt in &attempts {
        println!("  {:<12} {:?}", attempt.id, attempt.state);
    }
}

fn queue_is_drained(store: &InMemoryStore, repo: &RepoRef) -> bool {
    store.list_prs(repo).unwrap_or_default().is_empty() && store.list_attempts(repo).unwrap_or_default().is_empty()
}

/// Seed the demo queue and print its initial state without ticking the
/// poller.
pub fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let (store, _controller) = seeded_controller(&config);
    print_queue(&store, &demo_repo());
    Ok(())
}

/// Seed the demo queue and run exactly one poll tick.
pub fn poll_once(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let (store, controller) = seeded_controller(&config);
    let repo = demo_repo();
    let now = config.timeouts.debounce_secs + config.timeouts.constructing_secs + config.timeouts.testing_secs;
    controller.poll_repo(&repo, &config, now)?;
    print_queue(&store, &repo);
    Ok(())
}

/// Seed the demo queue and tick the poller repeatedly, advancing
/// simulated time by one `poll_period_secs` each tick, until the queue
/// drains or `max_ticks` is reached.
pub fn serve(config_path: &Path, max_ticks: u32) -> Result<()> {
    let config = load_config(config_path)?;
    let (store, controller) = seeded_controller(&config);
    let repo = demo_repo();
    let period = config.timeouts.poll_period_secs.max(1);

    for tick in 1..=max_ticks {
        let now = u64::from(tick) * period;
        controller.poll_repo(&repo, &config, now)?;
        println!("--- tick {tick} (t={now}s) ---");
        print_queue(&store, &repo);
        if queue_is_drained(&store, &repo) {
            println!("queue drained after {tick} tick(s)");
            return Ok(());
        }
    }
    println!("stopped after {max_ticks} ticks without draining (raise --max-ticks to let it finish)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_queue_drains_within_a_bounded_number_of_ticks() {
        let config = RepoConfig { timeouts: mergequeue_core::config::Timeouts { debounce_secs: 0, ..Default::default() }, ..RepoConfig::default() };
        let (store, controller) = seeded_controller(&config);
        let repo = demo_repo();
        let period = config.timeouts.poll_period_secs.max(1);
        let mut drained = false;
        for tick in 1..=50u32 {
            controller.poll_repo(&repo, &config, u64::from(tick) * period).unwrap();
            if queue_is_drained(&store, &repo) {
                drained = true;
                break;
            }
        }
        assert!(drained, "demo queue should fully drain against an always-green synthetic forge");
    }

    #[test]
    fn status_prints_without_advancing_any_pr_past_requested() {
        let config = RepoConfig::default();
        let (store, _controller) = seeded_controller(&config);
        let repo = demo_repo();
        let rows = store.list_prs(&repo).unwrap();
        assert_eq!(rows.len(), usize::try_from(DEMO_PR_COUNT).unwrap());
        assert!(rows.iter().all(|pr| pr.state == PrState::Queued || pr.state == PrState::Requested));
        assert!(store.list_attempts(&repo).unwrap().iter().all(|a| a.state != AttemptState::Success));
    }
}
