//! Engine wiring: store, reactor, sweeper and session timers

use std::sync::Arc;

use crate::action::Action;
use crate::config::Config;
use crate::gc::Sweeper;
use crate::git::{CloneRunner, GitCli, RepoUrl, Vcs};
use crate::lister::FileLister;
use crate::paths::SessionPaths;
use crate::reactor::Reactor;
use crate::state::RepoStatus;
use crate::store::{Store, Subscription};
use crate::timers::{ExpiryWatch, SessionTimers};
use crate::{Error, Result};

/// Route prefix under which listed files are served
pub const FILES_ROUTE: &str = "/files/";

/// Final result of a submitted URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Checkout listed; paths carry the `/files/` prefix
    Done { files: Vec<String> },
    Failed,
    /// The session was removed before the pipeline finished
    Expired,
}

/// Running clone orchestration engine
#[derive(Debug)]
pub struct Engine {
    store: Store,
    paths: SessionPaths,
    timers: SessionTimers,
    sweeper: Arc<Sweeper>,
    reactor: Subscription,
    expiry: Subscription,
}

impl Engine {
    /// Start an engine that shells out to git
    pub fn with_git(config: &Config) -> Self {
        Self::start(config, Arc::new(GitCli::from_config(&config.git)))
    }

    /// Start an engine on top of any `Vcs`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config, vcs: Arc<dyn Vcs>) -> Self {
        let store = Store::spawn();
        let paths = SessionPaths::new(config.sessions.data_dir.clone());
        let initial = store.get_state();

        let sweeper = Arc::new(Sweeper::spawn(
            paths.root().to_path_buf(),
            initial.session_ids(),
            config.gc.interval,
        ));
        let reactor = Reactor::new(
            initial,
            CloneRunner::new(store.clone(), vcs, paths.clone()),
            FileLister::new(store.clone(), paths.clone()),
            Arc::clone(&sweeper),
        );
        let reactor = store.subscribe(reactor);
        let timers = SessionTimers::new(store.clone(), config.sessions.max_age);
        let expiry = store.subscribe(ExpiryWatch::new(timers.clone()));

        tracing::info!(
            data_dir = %paths.root().display(),
            max_age = ?config.sessions.max_age,
            "Engine started"
        );

        Self {
            store,
            paths,
            timers,
            sweeper,
            reactor,
            expiry,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    /// Restart the inactivity timer of a session, creating it if needed
    pub async fn touch_session(&self, session_id: &str) -> Result<()> {
        SessionPaths::validate_session_id(session_id)?;
        self.timers.touch(session_id).await.map(|_| ())
    }

    /// Request `url` for a session and wait for the pipeline to settle
    pub async fn submit(&self, session_id: &str, url: &str) -> Result<RepoOutcome> {
        SessionPaths::validate_session_id(session_id)?;
        let repo = RepoUrl::parse(url)?;
        let url = repo.as_str();
        tracing::debug!(
            session_id = %session_id,
            host = %repo.host(),
            repo = %repo.name(),
            "Repository requested"
        );

        self.timers.touch(session_id).await?;
        self.store
            .apply(Action::start_clone(session_id, url))
            .await?;

        let Some(entry) = self.store.wait_for_repo(session_id, url).await else {
            return Ok(RepoOutcome::Expired);
        };

        match entry.status {
            RepoStatus::Done => Ok(RepoOutcome::Done {
                files: entry
                    .files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| format!("{}{}", FILES_ROUTE, p))
                    .collect(),
            }),
            RepoStatus::Failed => Ok(RepoOutcome::Failed),
            // only reachable when the store stopped mid-pipeline
            _ => Err(Error::StoreClosed),
        }
    }

    /// Stop timers, the sweeper and the store
    pub fn shutdown(&self) {
        self.timers.cancel_all();
        self.sweeper.shutdown();
        self.reactor.unsubscribe();
        self.expiry.unsubscribe();
        self.store.close();
        tracing::info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ProcessOutcome;
    use crate::state::Slug;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    const URL: &str = "https://host/repo.git";

    /// Writes a small checkout instead of running git
    #[derive(Default)]
    struct FakeVcs {
        fail: bool,
        gate: Option<Arc<Notify>>,
        clones: AtomicUsize,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl Vcs for FakeVcs {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn clone_shallow(&self, _url: &str, dest: &Path) -> Result<ProcessOutcome> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Ok(ProcessOutcome::failure(128, "fatal: repository not found"));
            }
            std::fs::create_dir_all(dest.join("src"))?;
            std::fs::create_dir_all(dest.join(".git"))?;
            std::fs::write(dest.join("README.md"), "# repo")?;
            std::fs::write(dest.join("src/main.go"), "package main")?;
            std::fs::write(dest.join(".git/HEAD"), "ref: refs/heads/main")?;
            Ok(ProcessOutcome::success())
        }

        async fn fetch_reset(&self, _dest: &Path) -> Result<ProcessOutcome> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessOutcome::success())
        }
    }

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.sessions.data_dir = temp.path().join("sessions");
        config.sessions.max_age = Duration::from_secs(60);
        config.gc.interval = Duration::ZERO;
        config
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !done() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_submit_lists_files() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::default());
        let engine = Engine::start(&config(&temp), vcs.clone());

        let outcome = engine.submit("s1", URL).await.unwrap();
        assert_eq!(
            outcome,
            RepoOutcome::Done {
                files: vec![
                    "/files/d3a075b/README.md".to_string(),
                    "/files/d3a075b/src/main.go".to_string(),
                ]
            }
        );

        let state = engine.store().get_state();
        let entry = state.repo("s1", URL).unwrap();
        assert_eq!(entry.status, RepoStatus::Done);
        assert_eq!(entry.slug, Some(Slug::for_url(URL)));
        assert!(engine.paths().repo_dir("s1", &Slug::for_url(URL)).exists());
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_failed_clone() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs {
            fail: true,
            ..Default::default()
        });
        let engine = Engine::start(&config(&temp), vcs);

        assert_eq!(engine.submit("s1", URL).await.unwrap(), RepoOutcome::Failed);

        let state = engine.store().get_state();
        let entry = state.repo("s1", URL).unwrap();
        assert_eq!(entry.status, RepoStatus::Failed);
        assert!(entry.files.is_none());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_duplicate_request_while_cloning_is_ignored() {
        let temp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let vcs = Arc::new(FakeVcs {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let engine = Engine::start(&config(&temp), vcs.clone());
        let store = engine.store().clone();

        store.apply(Action::start_clone("s1", URL)).await.unwrap();
        let mut watcher = store.watch();
        watcher
            .wait_for(|s| s.repo("s1", URL).map(|e| e.status) == Some(RepoStatus::Cloning))
            .await
            .unwrap();

        let before = store.get_state();
        let after = store.apply(Action::start_clone("s1", URL)).await.unwrap();
        assert_eq!(before.repo("s1", URL), after.repo("s1", URL));

        gate.notify_one();
        let entry = store.wait_for_repo("s1", URL).await.unwrap();
        assert_eq!(entry.status, RepoStatus::Done);
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_resubmit_fetches_existing_checkout() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::default());
        let engine = Engine::start(&config(&temp), vcs.clone());

        let first = engine.submit("s1", URL).await.unwrap();
        let second = engine.submit("s1", URL).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 1);
        assert_eq!(vcs.fetches.load(Ordering::SeqCst), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_removed_session_folder_is_collected() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::start(&config(&temp), Arc::new(FakeVcs::default()));

        engine.submit("s1", URL).await.unwrap();
        engine.submit("s2", URL).await.unwrap();
        let s1 = engine.paths().session_dir("s1");
        let s2 = engine.paths().session_dir("s2");
        assert!(s1.exists());

        engine
            .store()
            .apply(Action::remove_session("s1"))
            .await
            .unwrap();
        wait_until(|| !s1.exists()).await;

        assert!(!s1.exists());
        assert!(s2.exists());
        assert!(engine.store().get_state().session("s1").is_none());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_late_completion_after_removal_is_collected() {
        let temp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let vcs = Arc::new(FakeVcs {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let mut config = config(&temp);
        config.sessions.max_age = Duration::from_millis(300);
        let engine = Arc::new(Engine::start(&config, vcs));
        let session_dir = engine.paths().session_dir("s1");

        let pending = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit("s1", URL).await })
        };

        let mut watcher = engine.store().watch();
        watcher
            .wait_for(|s| s.repo("s1", URL).map(|e| e.status) == Some(RepoStatus::Cloning))
            .await
            .unwrap();
        engine.store().dispatch(Action::remove_session("s1"));

        assert_eq!(pending.await.unwrap().unwrap(), RepoOutcome::Expired);

        // the late report re-creates an empty, untimed session
        gate.notify_one();
        watcher
            .wait_for(|s| s.contains_session("s1"))
            .await
            .unwrap();
        assert!(engine.store().get_state().repo("s1", URL).is_none());

        // which is then given a timer, expires and has its folder swept
        wait_until(|| {
            !engine.store().get_state().contains_session("s1") && !session_dir.exists()
        })
        .await;
        assert!(!engine.store().get_state().contains_session("s1"));
        assert!(!session_dir.exists());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_dispatch() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::start(&config(&temp), Arc::new(FakeVcs::default()));

        let result = engine.submit("s1", "not a url").await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));

        let result = engine.submit("../escape", URL).await;
        assert!(matches!(result, Err(Error::Other(_))));

        assert!(engine.store().get_state().is_empty());
        engine.shutdown();
    }
}
