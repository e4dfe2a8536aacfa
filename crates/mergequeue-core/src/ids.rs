//! Validated identifiers for the merge-queue's data model.
//!
//! A private inner representation, a validating constructor,
//! `Display`/`FromStr`, and `serde` via `try_from`/`into` string
//! conversion so invalid values can never round-trip through
//! persistence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Owner / RepoName
// ---------------------------------------------------------------------------

/// A forge account or organization name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Owner(String);

/// A repository name, scoped to an [`Owner`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

/// Error returned when an [`Owner`] or [`RepoName`] fails validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameError {
    value: String,
    reason: &'static str,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for NameError {}

fn validate_name(s: &str) -> Result<(), NameError> {
    if s.is_empty() {
        return Err(NameError { value: s.to_owned(), reason: "must not be empty" });
    }
    if s.contains(char::is_whitespace) {
        return Err(NameError { value: s.to_owned(), reason: "must not contain whitespace" });
    }
    if s.contains('/') {
        return Err(NameError { value: s.to_owned(), reason: "must not contain '/'" });
    }
    Ok(())
}

macro_rules! name_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Validate and construct.
            ///
            /// # Errors
            /// Returns [`NameError`] if `value` is empty, contains
            /// whitespace, or contains a path separator.
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                let value = value.into();
                validate_name(&value)?;
                Ok(Self(value))
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = NameError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = NameError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    };
}

name_newtype!(Owner);
name_newtype!(RepoName);

// ---------------------------------------------------------------------------
// RepoRef
// ---------------------------------------------------------------------------

/// The natural per-repository serialization key: every Controller
/// entry point operating on a PR or attempt is scoped to one `RepoRef`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    /// The repository's owning account or organization.
    pub owner: Owner,
    /// The repository name.
    pub repo: RepoName,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// PrNumber
// ---------------------------------------------------------------------------

/// A pull request number, unique within a repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The unique identity of a [`crate::model::PullRequest`] row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrId {
    /// The owning repository.
    pub repo: RepoRef,
    /// The PR number within that repository.
    pub number: PrNumber,
}

impl fmt::Display for PrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.repo, self.number)
    }
}

// ---------------------------------------------------------------------------
// CommitHash
// ---------------------------------------------------------------------------

/// A 40-character lowercase hex commit SHA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash([u8; 40]);

impl CommitHash {
    /// Validate and construct from a hex string.
    ///
    /// # Errors
    /// Returns [`NameError`] if `value` is not exactly 40 lowercase hex
    /// characters.
    pub fn new(value: impl AsRef<str>) -> Result<Self, NameError> {
        let value = value.as_ref();
        if value.len() != 40 || !value.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(NameError {
                value: value.to_owned(),
                reason: "must be exactly 40 lowercase hex characters",
            });
        }
        let mut bytes = [0u8; 40];
        bytes.copy_from_slice(value.as_bytes());
        Ok(Self(bytes))
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // SAFETY-free: constructed only from validated ASCII hex bytes.
        std::str::from_utf8(&self.0).expect("CommitHash always holds validated ASCII")
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitHash {
    type Err = NameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = NameError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommitHash> for String {
    fn from(value: CommitHash) -> Self {
        value.as_str().to_owned()
    }
}

// ---------------------------------------------------------------------------
// MergeAttemptId
// ---------------------------------------------------------------------------

/// The opaque, globally unique id of a [`crate::model::MergeAttempt`].
///
/// The staging branch name is a deterministic function of this id (see
/// [`Self::staging_ref_name`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MergeAttemptId(String);

impl MergeAttemptId {
    /// Wrap an already-generated id string. Used by [`crate::ids::IdGen`]
    /// and by tests that need deterministic ids.
    ///
    /// # Errors
    /// Returns [`NameError`] if `value` is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NameError { value, reason: "must not be empty" });
        }
        Ok(Self(value))
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The deterministic staging branch ref for this attempt.
    #[must_use]
    pub fn staging_ref_name(&self) -> String {
        format!("refs/mergequeue/staging-{}", self.0)
    }
}

impl fmt::Display for MergeAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MergeAttemptId {
    type Error = NameError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MergeAttemptId> for String {
    fn from(value: MergeAttemptId) -> Self {
        value.0
    }
}

/// Generates globally-unique [`MergeAttemptId`]s.
///
/// Built on `terseid::hash` for deterministic short ids: each call
/// folds a monotonic counter and the current time into a short,
/// URL-safe id, short enough to embed directly into a staging branch
/// name.
#[derive(Default)]
pub struct IdGen {
    counter: std::sync::atomic::AtomicU64,
}

impl IdGen {
    /// Create a fresh generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next id.
    #[must_use]
    pub fn next(&self) -> MergeAttemptId {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seed = format!("{nanos}-{n}");
        let id = terseid::hash(seed.as_bytes(), 10);
        MergeAttemptId::new(id).expect("terseid::hash never returns an empty string")
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// An admission priority bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub u32);
