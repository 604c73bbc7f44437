//! Clone/fetch runner
//!
//! Claims a `start` entry by dispatching `cloning` before anything is
//! launched, then clones (or refreshes) the checkout in a background task and
//! reports the outcome as a follow-up action.

use std::path::Path;
use std::sync::Arc;

use super::vcs::{ProcessOutcome, Vcs};
use crate::action::{Action, RepoUpdate};
use crate::paths::SessionPaths;
use crate::state::Slug;
use crate::store::Store;
use crate::Result;

/// Runs clone and fetch operations on behalf of the reactor
#[derive(Clone)]
pub struct CloneRunner {
    store: Store,
    vcs: Arc<dyn Vcs>,
    paths: SessionPaths,
}

impl std::fmt::Debug for CloneRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloneRunner")
            .field("vcs", &self.vcs.name())
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl CloneRunner {
    pub fn new(store: Store, vcs: Arc<dyn Vcs>, paths: SessionPaths) -> Self {
        Self { store, vcs, paths }
    }

    /// Claim the entry and launch the clone or fetch
    ///
    /// The `cloning` status is queued before the task is spawned, so it is
    /// always applied ahead of the task's completion report.
    pub fn start(&self, session_id: &str, url: &str) {
        let slug = Slug::for_url(url);
        let folder = self.paths.repo_dir(session_id, &slug);

        self.store.dispatch(Action::set_repo_status(
            session_id,
            RepoUpdate::cloning(url, slug),
        ));

        let runner = self.clone();
        let session_id = session_id.to_string();
        let url = url.to_string();
        tokio::spawn(async move {
            let update = match runner.checkout(&url, &folder).await {
                Ok(outcome) if outcome.is_success() => {
                    tracing::info!(session_id = %session_id, url = %url, "Checkout ready");
                    RepoUpdate::clone_done(&url)
                }
                Ok(outcome) => {
                    tracing::warn!(
                        session_id = %session_id,
                        url = %url,
                        exit_code = ?outcome.exit_code,
                        reason = outcome.reason(),
                        stderr = %outcome.stderr,
                        "git clone/fetch failed"
                    );
                    RepoUpdate::failed(&url)
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        url = %url,
                        error = %e,
                        "git clone/fetch could not run"
                    );
                    RepoUpdate::failed(&url)
                }
            };
            runner
                .store
                .dispatch(Action::set_repo_status(session_id, update));
        });
    }

    /// Clone into a fresh folder, or fetch and hard-reset an existing one
    async fn checkout(&self, url: &str, folder: &Path) -> Result<ProcessOutcome> {
        if tokio::fs::try_exists(folder).await? {
            tracing::info!(url = %url, folder = %folder.display(), "Fetching existing checkout");
            return self.vcs.fetch_reset(folder).await;
        }

        if let Some(parent) = folder.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!(url = %url, folder = %folder.display(), "Cloning repository");
        self.vcs.clone_shallow(url, folder).await
    }
}
