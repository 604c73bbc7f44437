//! Change reactor
//!
//! Subscribes to the store and turns entries that have *just* reached
//! `start` or `clone_done` into clone and listing effects. Comparing each
//! entry with its previous value, rather than looking at the current status
//! alone, keeps unrelated dispatches from firing an effect twice.

use std::sync::Arc;

use crate::git::CloneRunner;
use crate::gc::Sweeper;
use crate::lister::FileLister;
use crate::state::{RepoStatus, SessionId, Slug, State};
use crate::store::Listener;

/// Side effect required by a state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Clone or refresh `url` for the session
    Clone { session_id: SessionId, url: String },
    /// List the files of a finished checkout
    ListFiles {
        session_id: SessionId,
        url: String,
        slug: Option<Slug>,
    },
}

/// Effects implied by moving from `previous` to `current`
///
/// Sessions sharing their allocation, or structurally equal, are skipped
/// without looking at their entries.
pub fn plan_effects(previous: &State, current: &State) -> Vec<Effect> {
    let mut effects = Vec::new();

    for (session_id, session) in current.sessions() {
        if current.shares_session(previous, session_id) {
            continue;
        }
        let before = previous.session(session_id);
        if before == Some(session) {
            continue;
        }

        for (url, entry) in &session.repos {
            if before.and_then(|s| s.repo(url)) == Some(entry) {
                continue;
            }

            match entry.status {
                RepoStatus::Start => effects.push(Effect::Clone {
                    session_id: session_id.clone(),
                    url: url.clone(),
                }),
                RepoStatus::CloneDone => effects.push(Effect::ListFiles {
                    session_id: session_id.clone(),
                    url: url.clone(),
                    slug: entry.slug.clone(),
                }),
                RepoStatus::Cloning | RepoStatus::Done | RepoStatus::Failed => {}
            }
        }
    }

    effects
}

/// Store listener executing planned effects
#[derive(Debug)]
pub struct Reactor {
    previous: Arc<State>,
    runner: CloneRunner,
    lister: FileLister,
    sweeper: Arc<Sweeper>,
}

impl Reactor {
    /// `initial` is the snapshot the first notification will be compared to
    pub fn new(
        initial: Arc<State>,
        runner: CloneRunner,
        lister: FileLister,
        sweeper: Arc<Sweeper>,
    ) -> Self {
        Self {
            previous: initial,
            runner,
            lister,
            sweeper,
        }
    }

    fn execute(&self, effect: Effect) {
        tracing::debug!(?effect, "Executing effect");
        match effect {
            Effect::Clone { session_id, url } => self.runner.start(&session_id, &url),
            Effect::ListFiles {
                session_id,
                url,
                slug,
            } => self.lister.start(&session_id, &url, slug),
        }
    }
}

impl Listener for Reactor {
    fn on_change(&mut self, state: &Arc<State>) {
        if !Arc::ptr_eq(&self.previous, state) {
            for effect in plan_effects(&self.previous, state) {
                self.execute(effect);
            }
        }

        self.sweeper.request(state.session_ids());
        self.previous = Arc::clone(state);
    }
}
