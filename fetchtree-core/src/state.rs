//! Session and repository state model
//!
//! Snapshots are immutable values. Each session is held behind an `Arc`, so
//! deriving a new snapshot clones only the session map and the one session
//! being changed; every previously handed out snapshot stays untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a browser session, assigned by the collaborator layer
pub type SessionId = String;

/// Status of one repository within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    /// Requested, waiting for the runner to pick it up
    Start,
    /// Clone or fetch in flight
    #[serde(alias = "in_progress")]
    Cloning,
    /// Checkout on disk, file listing pending
    CloneDone,
    /// Files listed
    Done,
    /// Clone, fetch or listing failed
    Failed,
}

impl RepoStatus {
    /// Check if this status ends the pipeline
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepoStatus::Done | RepoStatus::Failed)
    }

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Start => "start",
            RepoStatus::Cloning => "cloning",
            RepoStatus::CloneDone => "clone_done",
            RepoStatus::Done => "done",
            RepoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short content hash of a clone URL, naming its folder inside the session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Number of hex characters kept from the digest
    pub const LEN: usize = 7;

    /// Derive the slug for a URL
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let hex: String = digest
            .iter()
            .take(Self::LEN.div_ceil(2))
            .map(|byte| format!("{:02x}", byte))
            .collect();
        Self(hex[..Self::LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a session's removal timer
///
/// The timer itself lives with whoever armed it; the state only records the
/// handle so the timer can be found again and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// State of one repository within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub status: RepoStatus,

    /// Folder name under the session, recorded when cloning begins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<Slug>,

    /// Paths relative to the session folder; only set when `Done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl RepoEntry {
    /// A freshly requested entry
    pub fn start() -> Self {
        Self {
            status: RepoStatus::Start,
            slug: None,
            files: None,
        }
    }
}

/// All repositories requested by one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Entries keyed by clone URL
    pub repos: BTreeMap<String, RepoEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimerHandle>,
}

impl Session {
    pub fn repo(&self, url: &str) -> Option<&RepoEntry> {
        self.repos.get(url)
    }
}

/// Snapshot of every live session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    sessions: BTreeMap<SessionId, Arc<Session>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id).map(Arc::as_ref)
    }

    /// Look up one repository entry
    pub fn repo(&self, session_id: &str, url: &str) -> Option<&RepoEntry> {
        self.session(session_id).and_then(|s| s.repo(url))
    }

    /// Iterate sessions in id order
    pub fn sessions(&self) -> impl Iterator<Item = (&SessionId, &Session)> {
        self.sessions.iter().map(|(id, s)| (id, s.as_ref()))
    }

    /// Ids of all live sessions
    pub fn session_ids(&self) -> BTreeSet<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn contains_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// True when both snapshots share the very same session allocation
    pub(crate) fn shares_session(&self, other: &State, id: &str) -> bool {
        match (self.sessions.get(id), other.sessions.get(id)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Mutable access to a session, creating it when unknown
    ///
    /// Clones the session first if another snapshot still shares it.
    pub(crate) fn session_entry(&mut self, id: &str) -> &mut Session {
        let session = self.sessions.entry(id.to_string()).or_default();
        Arc::make_mut(session)
    }

    pub(crate) fn remove_session(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_sha256_prefix() {
        assert_eq!(Slug::for_url("https://host/repo.git").as_str(), "d3a075b");
        assert_eq!(
            Slug::for_url("https://github.com/rust-lang/rust.git").as_str(),
            "520a60e"
        );
    }

    #[test]
    fn test_slug_is_stable() {
        let a = Slug::for_url("https://host/repo.git");
        let b = Slug::for_url("https://host/repo.git");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Slug::LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_entry_copy_on_write() {
        let mut first = State::new();
        first
            .session_entry("s1")
            .repos
            .insert("u".to_string(), RepoEntry::start());

        let mut second = first.clone();
        assert!(second.shares_session(&first, "s1"));

        second.session_entry("s1").repos.get_mut("u").unwrap().status = RepoStatus::Cloning;

        assert!(!second.shares_session(&first, "s1"));
        assert_eq!(first.repo("s1", "u").unwrap().status, RepoStatus::Start);
        assert_eq!(second.repo("s1", "u").unwrap().status, RepoStatus::Cloning);
    }

    #[test]
    fn test_status_serialization() {
        let entry = RepoEntry {
            status: RepoStatus::CloneDone,
            slug: Some(Slug::for_url("https://host/repo.git")),
            files: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "clone_done");
        assert_eq!(json["slug"], "d3a075b");
        assert!(json.get("files").is_none());
    }

    #[test]
    fn test_in_progress_alias() {
        let status: RepoStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RepoStatus::Cloning);
    }
}
