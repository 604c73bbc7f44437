//! Actions accepted by the state store

use crate::state::{RepoStatus, SessionId, Slug, TimerHandle};

/// Status report for one repository, carried by `SetRepoStatus`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUpdate {
    pub url: String,
    pub status: RepoStatus,
    pub slug: Option<Slug>,
    pub files: Option<Vec<String>>,
}

impl RepoUpdate {
    fn new(url: impl Into<String>, status: RepoStatus) -> Self {
        Self {
            url: url.into(),
            status,
            slug: None,
            files: None,
        }
    }

    /// The runner has claimed the entry and is about to launch git
    pub fn cloning(url: impl Into<String>, slug: Slug) -> Self {
        Self {
            slug: Some(slug),
            ..Self::new(url, RepoStatus::Cloning)
        }
    }

    /// The checkout is on disk
    pub fn clone_done(url: impl Into<String>) -> Self {
        Self::new(url, RepoStatus::CloneDone)
    }

    /// Listing finished
    pub fn done(url: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            files: Some(files),
            ..Self::new(url, RepoStatus::Done)
        }
    }

    pub fn failed(url: impl Into<String>) -> Self {
        Self::new(url, RepoStatus::Failed)
    }
}

/// What an action does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Request a clone (or refresh) of `url`
    StartClone { url: String },
    /// Move an entry along its pipeline
    SetRepoStatus(RepoUpdate),
    /// Drop a session; `target` falls back to the action's session id
    RemoveSession { target: Option<SessionId> },
    /// Record the session's removal timer
    SetTimeout { timeout: TimerHandle },
}

impl ActionKind {
    /// Wire name of the action type
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::StartClone { .. } => "startClone",
            ActionKind::SetRepoStatus(_) => "setRepoStatus",
            ActionKind::RemoveSession { .. } => "removeSession",
            ActionKind::SetTimeout { .. } => "setTimeout",
        }
    }
}

/// An action addressed to a session
///
/// Actions without a session id are ignored by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub session_id: Option<SessionId>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(session_id: impl Into<SessionId>, kind: ActionKind) -> Self {
        Self {
            session_id: Some(session_id.into()),
            kind,
        }
    }

    pub fn start_clone(session_id: impl Into<SessionId>, url: impl Into<String>) -> Self {
        Self::new(session_id, ActionKind::StartClone { url: url.into() })
    }

    pub fn set_repo_status(session_id: impl Into<SessionId>, update: RepoUpdate) -> Self {
        Self::new(session_id, ActionKind::SetRepoStatus(update))
    }

    pub fn remove_session(session_id: impl Into<SessionId>) -> Self {
        Self::new(session_id, ActionKind::RemoveSession { target: None })
    }

    pub fn set_timeout(session_id: impl Into<SessionId>, timeout: TimerHandle) -> Self {
        Self::new(session_id, ActionKind::SetTimeout { timeout })
    }
}
