//! Session inactivity timers
//!
//! Each touch cancels the timer recorded on the session, arms a new one and
//! records its handle through a `setTimeout` action. When a timer fires it
//! dispatches `removeSession`, unless the session has meanwhile recorded a
//! different handle (it was removed and re-created, or touched again).
//!
//! Sessions created by anything other than a touch, such as a completion
//! report arriving after expiry, are given a timer by [`ExpiryWatch`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::action::Action;
use crate::state::{SessionId, State, TimerHandle};
use crate::store::{Listener, Store};
use crate::Result;

struct TimersInner {
    store: Store,
    max_age: Duration,
    next_id: AtomicU64,
    running: Mutex<HashMap<TimerHandle, AbortHandle>>,
    /// Serializes touches so the recorded handle is always the newest one
    touching: tokio::sync::Mutex<()>,
}

impl TimersInner {
    fn running(&self) -> MutexGuard<'_, HashMap<TimerHandle, AbortHandle>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removal timers for every session
#[derive(Clone)]
pub struct SessionTimers {
    inner: Arc<TimersInner>,
}

impl std::fmt::Debug for SessionTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimers")
            .field("max_age", &self.inner.max_age)
            .field("active", &self.active())
            .finish()
    }
}

impl SessionTimers {
    pub fn new(store: Store, max_age: Duration) -> Self {
        Self {
            inner: Arc::new(TimersInner {
                store,
                max_age,
                next_id: AtomicU64::new(1),
                running: Mutex::new(HashMap::new()),
                touching: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Restart the inactivity timer of a session
    ///
    /// Creates the session if it does not exist yet. Returns once the new
    /// handle is recorded in the state.
    pub async fn touch(&self, session_id: &str) -> Result<TimerHandle> {
        let _serial = self.inner.touching.lock().await;

        let recorded = self
            .inner
            .store
            .get_state()
            .session(session_id)
            .and_then(|s| s.timeout);
        if let Some(previous) = recorded {
            self.cancel(previous);
        }

        let handle = self.spawn_timer(session_id);
        self.inner
            .store
            .apply(Action::set_timeout(session_id, handle))
            .await?;
        Ok(handle)
    }

    /// Arm a timer for a session that has none and queue its `setTimeout`
    ///
    /// Safe to call from a store listener.
    pub fn arm(&self, session_id: &str) -> TimerHandle {
        let handle = self.spawn_timer(session_id);
        self.inner
            .store
            .dispatch(Action::set_timeout(session_id, handle));
        handle
    }

    fn spawn_timer(&self, session_id: &str) -> TimerHandle {
        let handle = TimerHandle::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        // Held across the spawn so a fast timer cannot forget itself before
        // it is registered.
        let mut running = self.inner.running();
        let inner = Arc::clone(&self.inner);
        let id = session_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.max_age).await;
            inner.running().remove(&handle);

            let recorded = inner.store.get_state().session(&id).and_then(|s| s.timeout);
            if recorded != Some(handle) {
                tracing::debug!(
                    session_id = %id,
                    timer = handle.id(),
                    "Ignoring stale session timer"
                );
                return;
            }

            tracing::info!(session_id = %id, timer = handle.id(), "Session expired");
            inner.store.dispatch(Action::remove_session(id));
        });
        running.insert(handle, task.abort_handle());

        handle
    }

    /// Cancel one timer; returns false if it already fired or was unknown
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        match self.inner.running().remove(&handle) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, task) in self.inner.running().drain() {
            task.abort();
        }
    }

    /// Number of armed timers
    pub fn active(&self) -> usize {
        self.inner.running().len()
    }
}

/// Store listener arming a timer for every session that has none
///
/// Sessions it armed are remembered until their handle shows up in the
/// state, so the queued `setTimeout` is not duplicated meanwhile.
#[derive(Debug)]
pub struct ExpiryWatch {
    timers: SessionTimers,
    arming: HashSet<SessionId>,
}

impl ExpiryWatch {
    pub fn new(timers: SessionTimers) -> Self {
        Self {
            timers,
            arming: HashSet::new(),
        }
    }
}

impl Listener for ExpiryWatch {
    fn on_change(&mut self, state: &Arc<State>) {
        self.arming
            .retain(|id| state.session(id).is_some_and(|s| s.timeout.is_none()));

        for (id, session) in state.sessions() {
            if session.timeout.is_none() && !self.arming.contains(id) {
                tracing::debug!(session_id = %id, "Arming timer for untimed session");
                self.timers.arm(id);
                self.arming.insert(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RepoUpdate;

    #[tokio::test]
    async fn test_touch_records_handle() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));

        let handle = timers.touch("s1").await.unwrap();
        assert_eq!(store.get_state().session("s1").unwrap().timeout, Some(handle));
        assert_eq!(timers.active(), 1);
    }

    #[tokio::test]
    async fn test_touch_replaces_previous_timer() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));

        let first = timers.touch("s1").await.unwrap();
        let second = timers.touch("s1").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(timers.active(), 1);
        assert!(!timers.cancel(first));
        assert_eq!(store.get_state().session("s1").unwrap().timeout, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_removes_session() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));
        store
            .apply(Action::start_clone("s1", "https://host/repo.git"))
            .await
            .unwrap();
        timers.touch("s1").await.unwrap();

        let mut watcher = store.watch();
        tokio::time::sleep(Duration::from_secs(61)).await;
        watcher
            .wait_for(|state| !state.contains_session("s1"))
            .await
            .unwrap();

        assert!(store.get_state().session("s1").is_none());
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_postpones_expiry() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));
        timers.touch("s1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        timers.touch("s1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;

        // the round trip through the store settles queued actions
        store
            .apply(Action::set_timeout("other", TimerHandle::new(999)))
            .await
            .unwrap();
        assert!(store.get_state().contains_session("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_of_removed_session_spares_recreated_one() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));
        timers.touch("s1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        store.apply(Action::remove_session("s1")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = timers.touch("s1").await.unwrap();

        // the first timer fires at 60s and unregisters itself
        tokio::time::sleep(Duration::from_secs(45)).await;
        while timers.active() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store
            .apply(Action::set_timeout("other", TimerHandle::new(999)))
            .await
            .unwrap();
        assert_eq!(store.get_state().session("s1").unwrap().timeout, Some(second));

        let mut watcher = store.watch();
        tokio::time::sleep(Duration::from_secs(20)).await;
        watcher
            .wait_for(|state| !state.contains_session("s1"))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_untimed_session_is_armed_and_expires() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));
        let _watch = store.subscribe(ExpiryWatch::new(timers.clone()));

        // a completion report for a session that no longer exists
        store
            .apply(Action::set_repo_status(
                "late",
                RepoUpdate::clone_done("https://host/repo.git"),
            ))
            .await
            .unwrap();

        let mut watcher = store.watch();
        watcher
            .wait_for(|state| state.session("late").is_some_and(|s| s.timeout.is_some()))
            .await
            .unwrap();
        assert_eq!(timers.active(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        watcher
            .wait_for(|state| !state.contains_session("late"))
            .await
            .unwrap();
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test]
    async fn test_touched_session_is_not_armed_twice() {
        let store = Store::spawn();
        let timers = SessionTimers::new(store.clone(), Duration::from_secs(60));
        let _watch = store.subscribe(ExpiryWatch::new(timers.clone()));

        let handle = timers.touch("s1").await.unwrap();
        store
            .apply(Action::start_clone("s1", "https://host/repo.git"))
            .await
            .unwrap();

        assert_eq!(timers.active(), 1);
        assert_eq!(store.get_state().session("s1").unwrap().timeout, Some(handle));
    }
}
