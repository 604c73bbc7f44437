//! Pure state transitions
//!
//! `reduce` never performs I/O. An action that changes nothing returns the
//! input snapshot itself, so callers may use `Arc::ptr_eq` as a cheap
//! "unchanged" test.

use std::sync::Arc;

use crate::action::{Action, ActionKind, RepoUpdate};
use crate::state::{RepoEntry, RepoStatus, Session, State, TimerHandle};

/// Modification of a single session computed by the reducer
enum SessionChange {
    Repo { url: String, entry: RepoEntry },
    Timeout(TimerHandle),
}

/// Compute the snapshot that follows `state` once `action` is applied
pub fn reduce(state: &Arc<State>, action: &Action) -> Arc<State> {
    let Some(session_id) = action.session_id.as_deref() else {
        return Arc::clone(state);
    };

    if let ActionKind::RemoveSession { target } = &action.kind {
        let target = target.as_deref().unwrap_or(session_id);
        if !state.contains_session(target) {
            return Arc::clone(state);
        }
        let mut next = State::clone(state);
        next.remove_session(target);
        return Arc::new(next);
    }

    let existing = state.session(session_id);
    let change = session_change(existing, &action.kind);
    if existing.is_some() && change.is_none() {
        return Arc::clone(state);
    }

    // Unknown sessions are created even when the action itself is a no-op.
    let mut next = State::clone(state);
    let session = next.session_entry(session_id);
    match change {
        Some(SessionChange::Repo { url, entry }) => {
            session.repos.insert(url, entry);
        }
        Some(SessionChange::Timeout(handle)) => session.timeout = Some(handle),
        None => {}
    }
    Arc::new(next)
}

fn session_change(session: Option<&Session>, kind: &ActionKind) -> Option<SessionChange> {
    match kind {
        ActionKind::StartClone { url } => {
            start_clone(session.and_then(|s| s.repo(url))).map(|entry| SessionChange::Repo {
                url: url.clone(),
                entry,
            })
        }
        ActionKind::SetRepoStatus(update) => {
            set_repo_status(session.and_then(|s| s.repo(&update.url)), update).map(|entry| {
                SessionChange::Repo {
                    url: update.url.clone(),
                    entry,
                }
            })
        }
        ActionKind::SetTimeout { timeout } => {
            let current = session.and_then(|s| s.timeout);
            (current != Some(*timeout)).then_some(SessionChange::Timeout(*timeout))
        }
        ActionKind::RemoveSession { .. } => None,
    }
}

/// Absent and finished entries restart; anything else is already in flight
fn start_clone(current: Option<&RepoEntry>) -> Option<RepoEntry> {
    match current {
        None => Some(RepoEntry::start()),
        Some(entry) if entry.status == RepoStatus::Done => Some(RepoEntry {
            status: RepoStatus::Start,
            slug: entry.slug.clone(),
            files: None,
        }),
        Some(_) => None,
    }
}

fn set_repo_status(current: Option<&RepoEntry>, update: &RepoUpdate) -> Option<RepoEntry> {
    let entry = current?;
    let next = match (entry.status, update.status) {
        (RepoStatus::Failed, RepoStatus::Failed) => return None,
        (_, RepoStatus::Failed) => RepoEntry {
            status: RepoStatus::Failed,
            slug: entry.slug.clone(),
            files: None,
        },
        (RepoStatus::Start, RepoStatus::Cloning) => RepoEntry {
            status: RepoStatus::Cloning,
            slug: Some(update.slug.clone()?),
            files: None,
        },
        (RepoStatus::Cloning, RepoStatus::CloneDone) => RepoEntry {
            status: RepoStatus::CloneDone,
            slug: entry.slug.clone(),
            files: None,
        },
        (RepoStatus::CloneDone, RepoStatus::Done) => RepoEntry {
            status: RepoStatus::Done,
            slug: entry.slug.clone(),
            files: Some(update.files.clone()?),
        },
        _ => return None,
    };
    Some(next)
}
