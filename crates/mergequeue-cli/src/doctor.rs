//! `mergequeue doctor`: validate a repository's `mergequeue.toml`.
//!
//! One `check_*` helper per concern, `[OK]`/`[FAIL]`/`[WARN]` prefixed
//! lines, and a final pass/fail summary rather than bailing out on the
//! first problem.

use std::path::Path;

use anyhow::Result;
use mergequeue_core::config::RepoConfig;

/// Validate `config_path` and report what the Controller would
/// actually do with it.
#[allow(clippy::unnecessary_wraps)]
pub fn run(config_path: &Path) -> Result<()> {
    println!("mergequeue doctor");
    println!("=================");
    println!();

    let mut all_ok = true;

    let config = match RepoConfig::load(config_path) {
        Ok(config) => {
            if config_path.exists() {
                println!("[OK] {}: parsed", config_path.display());
            } else {
                println!("[OK] {}: not found, using defaults", config_path.display());
            }
            config
        }
        Err(e) => {
            println!("[FAIL] {}: {e}", config_path.display());
            return Ok(());
        }
    };

    all_ok &= check_allowed_branches(&config);
    all_ok &= check_timeouts(&config);
    check_required_status_contexts(&config);
    check_command_prefix(&config);

    println!();
    println!("merge strategy: {:?}", config.merge_strategy);

    println!();
    if all_ok {
        println!("All required checks passed!");
    } else {
        println!("Some required checks failed. See above for details.");
    }

    Ok(())
}

fn check_allowed_branches(config: &RepoConfig) -> bool {
    if config.allowed_branches.is_empty() {
        println!("[FAIL] allowed_branches: empty — no branch is ever admissible");
        println!("       Add at least one branch name to [repo] allowed_branches.");
        false
    } else {
        println!("[OK] allowed_branches: {}", config.allowed_branches.join(", "));
        if config.allowed_branches.len() > 1 {
            println!(
                "       note: only the first entry, {:?}, is used as the merge target.",
                config.allowed_branches[0]
            );
        }
        true
    }
}

fn check_required_status_contexts(config: &RepoConfig) {
    if config.required_status_contexts.is_empty() {
        println!(
            "[WARN] required_status_contexts: empty — pre-status and CI-on-staging both pass on the combined status alone"
        );
    } else {
        println!("[OK] required_status_contexts: {}", config.required_status_contexts.join(", "));
    }
}

fn check_command_prefix(config: &RepoConfig) {
    if config.command_prefix.trim().is_empty() {
        println!("[WARN] command_prefix: empty — every comment will be treated as a bot command");
    } else {
        println!("[OK] command_prefix: {:?}", config.command_prefix);
    }
}

fn check_timeouts(config: &RepoConfig) -> bool {
    let t = &config.timeouts;
    if t.poll_period_secs == 0 {
        println!("[FAIL] timeouts.poll_period_secs: 0 — the poller would spin continuously");
        return false;
    }
    if t.debounce_secs > t.queued_secs {
        println!(
            "[FAIL] timeouts.debounce_secs ({}) exceeds timeouts.queued_secs ({}) — every PR would time out before it could ever be admitted",
            t.debounce_secs, t.queued_secs
        );
        return false;
    }
    println!(
        "[OK] timeouts: poll every {}s, debounce {}s, queued timeout {}s",
        t.poll_period_secs, t.debounce_secs, t.queued_secs
    );
    true
}
