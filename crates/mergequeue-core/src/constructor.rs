//! The merge constructor: folds an ordered batch of PRs onto a
//! target-branch tip and produces either a staging commit or the list of
//! PRs that conflicted.
//!
//! Strategy polymorphism is a closed enum selected at runtime from
//! configuration, dispatching to one unit struct per variant, rather
//! than exposing strategy-specific types to the Controller.

use serde::{Deserialize, Serialize};

use crate::forge::{ForgeClient, ForgeError};
use crate::ids::{CommitHash, PrId};

/// One of the six merge construction strategies. Selected per
/// repository via [`crate::config::RepoConfig::merge_strategy`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Sequential merges; result is the rolling tip.
    #[default]
    Merge,
    /// Sequential merges, then one commit whose tree is the rolling tip
    /// and whose parents are the PR heads.
    Octopus,
    /// After each PR merges, synthesize a single-parent commit on top of
    /// the rolling squashed tip.
    Squash,
    /// One final single-parent commit whose tree is the rolling tip and
    /// whose parent is `base_sha`.
    BatchSquash,
    /// Replay each PR's feature commits (three-dot range) onto the
    /// rolling tip in order; reject PRs containing merge commits.
    CherryPick,
    /// Permitted only for a single PR already ancestor-compatible with
    /// `base_sha`; otherwise falls back to conflict.
    FastForward,
}

/// The constructor failed to land the batch.
#[derive(Debug)]
pub enum ConstructError {
    /// One or more PRs could not be folded in.
    Conflict(Vec<PrId>),
    /// The forge reported a transient error while constructing.
    Forge(ForgeError),
}

impl std::fmt::Display for ConstructError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict(prs) => {
                write!(f, "conflict involving {}", prs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
            Self::Forge(e) => write!(f, "forge error during construction: {e}"),
        }
    }
}

impl std::error::Error for ConstructError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Forge(e) => Some(e),
            Self::Conflict(_) => None,
        }
    }
}

impl From<ForgeError> for ConstructError {
    fn from(e: ForgeError) -> Self {
        Self::Forge(e)
    }
}

/// A strategy that can fold a batch of PRs into one staging commit.
pub trait MergeConstructor {
    /// Construct a staging commit from `base` and `prs`, in order.
    ///
    /// # Errors
    /// Returns [`ConstructError::Conflict`] naming every PR that could not
    /// be folded in, or [`ConstructError::Forge`] on a transient forge
    /// failure.
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError>;
}

/// Fold every PR onto `base` via sequential forge merges. Returns the
/// rolling tip plus the PRs that conflicted (empty on full success).
fn fold_sequential(
    forge: &dyn ForgeClient,
    base: &CommitHash,
    prs: &[(PrId, CommitHash)],
) -> Result<(CommitHash, Vec<PrId>), ForgeError> {
    let mut rolling = *base;
    let mut conflicted = Vec::new();
    for (pr, head) in prs {
        match forge.create_merge_commit(pr, &rolling, head)? {
            Some(merged) => rolling = merged,
            None => conflicted.push(pr.clone()),
        }
    }
    Ok((rolling, conflicted))
}

/// `merge`: sequential merges, result is the rolling tip.
pub struct MergeImpl;

impl MergeConstructor for MergeImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let (tip, conflicted) = fold_sequential(forge, base, prs)?;
        if conflicted.is_empty() { Ok(tip) } else { Err(ConstructError::Conflict(conflicted)) }
    }
}

/// `octopus`: sequential merges, then one commit whose tree is the
/// rolling tip and whose parents are the PR heads.
pub struct OctopusImpl;

impl MergeConstructor for OctopusImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let (tip, conflicted) = fold_sequential(forge, base, prs)?;
        if !conflicted.is_empty() {
            return Err(ConstructError::Conflict(conflicted));
        }
        let heads: Vec<CommitHash> = prs.iter().map(|(_, head)| *head).collect();
        let scope = &prs.first().ok_or_else(|| ConstructError::Conflict(Vec::new()))?.0;
        let commit = forge.create_commit(scope, &tip, &heads, "octopus merge")?;
        Ok(commit)
    }
}

/// `squash`: after each PR merges, synthesize a single-parent commit on
/// top of the rolling squashed tip.
pub struct SquashImpl;

impl MergeConstructor for SquashImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let mut rolling = *base;
        let mut conflicted = Vec::new();
        for (pr, head) in prs {
            match forge.create_merge_commit(pr, &rolling, head)? {
                Some(merged) => {
                    let squashed =
                        forge.create_commit(pr, &merged, std::slice::from_ref(&rolling), "squash")?;
                    rolling = squashed;
                }
                None => conflicted.push(pr.clone()),
            }
        }
        if conflicted.is_empty() { Ok(rolling) } else { Err(ConstructError::Conflict(conflicted)) }
    }
}

/// `batch-squash`: one final single-parent commit whose tree equals the
/// rolling tip and whose parent is `base_sha`.
pub struct BatchSquashImpl;

impl MergeConstructor for BatchSquashImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let (tip, conflicted) = fold_sequential(forge, base, prs)?;
        if !conflicted.is_empty() {
            return Err(ConstructError::Conflict(conflicted));
        }
        let scope = &prs.first().ok_or_else(|| ConstructError::Conflict(Vec::new()))?.0;
        let commit = forge.create_commit(scope, &tip, std::slice::from_ref(base), "batch squash")?;
        Ok(commit)
    }
}

/// `cherry-pick`: enumerate feature commits per PR via the three-dot
/// compare; reject PRs containing merge commits; replay each remaining
/// commit with the rolling tip as parent.
pub struct CherryPickImpl;

impl MergeConstructor for CherryPickImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let mut rolling = *base;
        let mut conflicted = Vec::new();
        for (pr, head) in prs {
            let commits = forge.compare_commits(pr, &rolling, head)?;
            if commits.iter().any(|c| c.is_merge) {
                conflicted.push(pr.clone());
                continue;
            }
            for commit in &commits {
                rolling = forge.create_commit(
                    pr,
                    &commit.sha,
                    std::slice::from_ref(&rolling),
                    "cherry-pick",
                )?;
            }
        }
        if conflicted.is_empty() { Ok(rolling) } else { Err(ConstructError::Conflict(conflicted)) }
    }
}

/// `fast-forward`: permitted only when the batch has a single PR already
/// ancestor-compatible with `base`; otherwise falls back to conflict.
pub struct FastForwardImpl;

impl MergeConstructor for FastForwardImpl {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        let [(pr, head)] = prs else {
            return Err(ConstructError::Conflict(prs.iter().map(|(pr, _)| pr.clone()).collect()));
        };
        match forge.create_merge_commit(pr, base, head)? {
            Some(merged) if merged == *head => Ok(merged),
            _ => Err(ConstructError::Conflict(vec![pr.clone()])),
        }
    }
}

/// A concrete constructor selected at runtime from
/// [`crate::config::RepoConfig::merge_strategy`]. An enum rather than
/// `Box<dyn MergeConstructor>`, since the Controller never needs to
/// hold a constructor past one call.
pub enum AnyConstructor {
    /// See [`MergeImpl`].
    Merge(MergeImpl),
    /// See [`OctopusImpl`].
    Octopus(OctopusImpl),
    /// See [`SquashImpl`].
    Squash(SquashImpl),
    /// See [`BatchSquashImpl`].
    BatchSquash(BatchSquashImpl),
    /// See [`CherryPickImpl`].
    CherryPick(CherryPickImpl),
    /// See [`FastForwardImpl`].
    FastForward(FastForwardImpl),
}

impl AnyConstructor {
    /// Select the constructor configured for `strategy`.
    #[must_use]
    pub const fn from_strategy(strategy: MergeStrategy) -> Self {
        match strategy {
            MergeStrategy::Merge => Self::Merge(MergeImpl),
            MergeStrategy::Octopus => Self::Octopus(OctopusImpl),
            MergeStrategy::Squash => Self::Squash(SquashImpl),
            MergeStrategy::BatchSquash => Self::BatchSquash(BatchSquashImpl),
            MergeStrategy::CherryPick => Self::CherryPick(CherryPickImpl),
            MergeStrategy::FastForward => Self::FastForward(FastForwardImpl),
        }
    }
}

impl MergeConstructor for AnyConstructor {
    fn construct(
        &self,
        forge: &dyn ForgeClient,
        base: &CommitHash,
        prs: &[(PrId, CommitHash)],
    ) -> Result<CommitHash, ConstructError> {
        match self {
            Self::Merge(c) => c.construct(forge, base, prs),
            Self::Octopus(c) => c.construct(forge, base, prs),
            Self::Squash(c) => c.construct(forge, base, prs),
            Self::BatchSquash(c) => c.construct(forge, base, prs),
            Self::CherryPick(c) => c.construct(forge, base, prs),
            Self::FastForward(c) => c.construct(forge, base, prs),
        }
    }
}
