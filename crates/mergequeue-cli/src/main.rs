use anyhow::Result;
use clap::{Parser, Subcommand};

mod demo;
mod doctor;

/// Merge-queue bot ops CLI
///
/// mergequeue coordinates the merge-queue bot's core library: a
/// single-binary way to validate a repository's configuration, check
/// local prerequisites, and exercise the Controller/poller over a
/// seeded in-memory queue without standing up a real forge client.
///
/// The real deployment's HTTP webhook receiver and forge REST client
/// are out of scope for this crate — `serve` and `poll-once` here
/// drive the Controller over a synthetic forge, which is why every PR
/// in `demo`/`serve`/`poll-once` output is invented rather than fetched.
///
/// QUICK START:
///
///   mergequeue doctor config.toml
///   mergequeue demo config.toml
///   mergequeue status config.toml
#[derive(Parser)]
#[command(name = "mergequeue")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'mergequeue <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check local prerequisites and validate a repository config
    ///
    /// Verifies the config file parses, its allowed branches and
    /// required status contexts are non-empty, and reports the
    /// resolved timeout table.
    Doctor {
        /// Path to the repository's mergequeue.toml. Missing file means
        /// defaults, same as the Controller's own `RepoConfig::load`.
        #[arg(default_value = "mergequeue.toml")]
        config: std::path::PathBuf,
    },

    /// Run one poller tick over a freshly seeded demo queue
    ///
    /// Seeds a handful of PRs into an in-memory Store behind a
    /// synthetic ForgeClient that always reports green, drives one
    /// `Controller::request`/`poll_repo` pass, and prints the
    /// resulting queue state. Useful for sanity-checking a config
    /// file's timeouts/strategy against realistic admission behavior
    /// without a live repository.
    PollOnce {
        /// Path to the repository's mergequeue.toml.
        #[arg(default_value = "mergequeue.toml")]
        config: std::path::PathBuf,
    },

    /// Run the demo queue continuously, ticking the poller on an interval
    ///
    /// Like `poll-once`, but loops: each tick the synthetic forge
    /// reports its queued commits green, and the run exits once the
    /// queue has fully drained or after `--max-ticks`, whichever comes
    /// first.
    Serve {
        /// Path to the repository's mergequeue.toml.
        #[arg(default_value = "mergequeue.toml")]
        config: std::path::PathBuf,

        /// Stop after this many ticks even if the queue has not drained.
        #[arg(long, default_value_t = 20)]
        max_ticks: u32,
    },

    /// Print the current demo queue's PR and attempt rows
    ///
    /// Seeds and immediately reports, without ticking the poller — the
    /// row-shape equivalent of `poll-once --max-ticks 0`.
    Status {
        /// Path to the repository's mergequeue.toml.
        #[arg(default_value = "mergequeue.toml")]
        config: std::path::PathBuf,
    },
}

fn main() -> Result<()> {
    let _telemetry = mergequeue_core::telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor { config } => doctor::run(&config),
        Commands::PollOnce { config } => demo::poll_once(&config),
        Commands::Serve { config, max_ticks } => demo::serve(&config, max_ticks),
        Commands::Status { config } => demo::status(&config),
    }
}
