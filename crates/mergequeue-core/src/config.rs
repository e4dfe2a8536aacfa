//! Per-repository configuration: allow-listed target branches, merge
//! strategy, required status contexts, priority resolver, bot command
//! syntax, and the poller's timeout constants.
//!
//! TOML via `serde`, every table `#[serde(deny_unknown_fields)]` so
//! typos fail loudly, `load` treating a missing file as defaults rather
//! than an error, and `parse` annotating errors with a line number
//! computed from the byte offset `toml` reports.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constructor::MergeStrategy;

/// Top-level configuration for one repository's merge queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RepoConfig {
    /// Branches the bot is allowed to land onto.
    pub allowed_branches: Vec<String>,
    /// Which of the six strategies the constructor should use.
    pub merge_strategy: MergeStrategy,
    /// Status contexts that must report `success` for pre-status
    /// and for CI-on-staging to count as green. Empty means "the
    /// combined status as a whole."
    pub required_status_contexts: Vec<String>,
    /// The prefix bot commands must start with, e.g. `"bors"` for `bors
    /// r+`. Grounded on the bors-family convention of a configurable
    /// command prefix.
    pub command_prefix: String,
    /// Timeout/debounce constants.
    pub timeouts: Timeouts,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            allowed_branches: vec!["main".to_owned()],
            merge_strategy: MergeStrategy::Merge,
            required_status_contexts: Vec::new(),
            command_prefix: "bors".to_owned(),
            timeouts: Timeouts::default(),
        }
    }
}

/// The poller's authoritative timeout/debounce constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Timeouts {
    /// `REQUESTED` timeout, in seconds. Default 1 hour.
    pub requested_secs: u64,
    /// `QUEUED` timeout, in seconds. Default 24 hours.
    pub queued_secs: u64,
    /// `MERGING` timeout, in seconds. Default 24 hours.
    pub merging_secs: u64,
    /// `SPLIT` timeout, in seconds. Default 24 hours.
    pub split_secs: u64,
    /// `CONSTRUCTING` timeout, in seconds. Default 15 minutes.
    pub constructing_secs: u64,
    /// `TESTING` timeout, in seconds. Default 1 hour.
    pub testing_secs: u64,
    /// `SUCCESS` timeout, in seconds. Default 15 minutes.
    pub success_secs: u64,
    /// Poll period, in seconds. Default 10 minutes.
    pub poll_period_secs: u64,
    /// Batching debounce, in seconds, measured from the oldest `QUEUED`
    /// PR in the admitted bucket. Default 10 minutes.
    pub debounce_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            requested_secs: 60 * 60,
            queued_secs: 24 * 60 * 60,
            merging_secs: 24 * 60 * 60,
            split_secs: 24 * 60 * 60,
            constructing_secs: 15 * 60,
            testing_secs: 60 * 60,
            success_secs: 15 * 60,
            poll_period_secs: 10 * 60,
            debounce_secs: 10 * 60,
        }
    }
}

impl RepoConfig {
    /// Load configuration from a TOML file. A missing file yields
    /// [`RepoConfig::default`] rather than an error — a repository that
    /// never configured the bot still gets sane defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but fails to parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError { path: Some(path.to_path_buf()), message: e.to_string() });
            }
        };
        Self::parse(&contents).map_err(|message| ConfigError { path: Some(path.to_path_buf()), message })
    }

    /// Parse configuration from a TOML string, annotating parse failures
    /// with a line number.
    ///
    /// # Errors
    /// Returns a human-readable message (not yet wrapped in
    /// [`ConfigError`] — callers that have a path wrap it via
    /// [`Self::load`]) if `contents` is not valid configuration.
    pub fn parse(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| {
            let line = e.span().map(|span| contents[..span.start].matches('\n').count() + 1);
            match line {
                Some(line) => format!("line {line}: {e}"),
                None => e.to_string(),
            }
        })
    }
}

/// Error loading or parsing a [`RepoConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The file that was being read, if any.
    pub path: Option<PathBuf>,
    /// The underlying error message (line-annotated for parse failures).
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in {}: {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_table() {
        let t = Timeouts::default();
        assert_eq!(t.requested_secs, 3600);
        assert_eq!(t.queued_secs, 86_400);
        assert_eq!(t.merging_secs, 86_400);
        assert_eq!(t.split_secs, 86_400);
        assert_eq!(t.constructing_secs, 900);
        assert_eq!(t.testing_secs, 3600);
        assert_eq!(t.success_secs, 900);
        assert_eq!(t.poll_period_secs, 600);
        assert_eq!(t.debounce_secs, 600);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let path = Path::new("/nonexistent/mergequeue.toml");
        let config = RepoConfig::load(path).unwrap();
        assert_eq!(config, RepoConfig::default());
    }

    #[test]
    fn parse_minimal_toml() {
        let config = RepoConfig::parse(r#"allowed_branches = ["main", "release"]"#).unwrap();
        assert_eq!(config.allowed_branches, vec!["main", "release"]);
        assert_eq!(config.merge_strategy, MergeStrategy::Merge);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = RepoConfig::parse("typo_field = 1").unwrap_err();
        assert!(err.contains("line"));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            allowed_branches = ["main"]
            merge_strategy = "squash"
            required_status_contexts = ["ci/build"]
            command_prefix = "bors"

            [timeouts]
            requested_secs = 100
            queued_secs = 200
            merging_secs = 300
            split_secs = 400
            constructing_secs = 500
            testing_secs = 600
            success_secs = 700
            poll_period_secs = 800
            debounce_secs = 900
        "#;
        let config = RepoConfig::parse(toml).unwrap();
        assert_eq!(config.merge_strategy, MergeStrategy::Squash);
        assert_eq!(config.timeouts.requested_secs, 100);
        assert_eq!(config.timeouts.debounce_secs, 900);
    }

    #[test]
    fn load_roundtrips_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mergequeue.toml");
        std::fs::write(&path, r#"command_prefix = "merge-bot""#).unwrap();
        let config = RepoConfig::load(&path).unwrap();
        assert_eq!(config.command_prefix, "merge-bot");
    }

    #[test]
    fn config_error_display_includes_path() {
        let err = ConfigError { path: Some(PathBuf::from("/a/b.toml")), message: "bad".into() };
        assert!(err.to_string().contains("/a/b.toml"));
    }
}
