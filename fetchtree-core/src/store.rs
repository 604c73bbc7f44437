//! State store actor
//!
//! One tokio task owns the canonical snapshot and applies actions strictly
//! one at a time. After every applied action the new snapshot is published on
//! a watch channel (backing [`Store::get_state`]) and every listener is called
//! once, synchronously, from the actor task.
//!
//! Dispatching from inside a listener only queues the action: it is applied
//! after the current notification round has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::action::Action;
use crate::reducer::reduce;
use crate::state::{RepoEntry, State};
use crate::{Error, Result};

/// Callback invoked after every applied action
pub trait Listener: Send {
    fn on_change(&mut self, state: &Arc<State>);
}

impl<F> Listener for F
where
    F: FnMut(&Arc<State>) + Send,
{
    fn on_change(&mut self, state: &Arc<State>) {
        self(state)
    }
}

/// Handle returned by [`Store::subscribe`]
///
/// Unsubscribing takes effect from the next notification round, so the
/// round currently being delivered reaches every listener it started with.
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

enum Command {
    Dispatch {
        action: Action,
        ack: Option<oneshot::Sender<Arc<State>>>,
    },
    Subscribe {
        listener: Box<dyn Listener>,
        active: Arc<AtomicBool>,
    },
    Close,
}

struct Registered {
    listener: Box<dyn Listener>,
    active: Arc<AtomicBool>,
}

struct StoreActor {
    state: Arc<State>,
    commands: mpsc::UnboundedReceiver<Command>,
    published: watch::Sender<Arc<State>>,
    listeners: Vec<Registered>,
}

impl StoreActor {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Dispatch { action, ack } => {
                    self.apply(&action);
                    if let Some(ack) = ack {
                        let _ = ack.send(Arc::clone(&self.state));
                    }
                }
                Command::Subscribe { listener, active } => {
                    self.listeners.push(Registered { listener, active });
                }
                Command::Close => break,
            }
        }
        tracing::debug!("State store stopped");
    }

    fn apply(&mut self, action: &Action) {
        let next = reduce(&self.state, action);
        tracing::debug!(
            action = action.kind.name(),
            session_id = ?action.session_id,
            changed = !Arc::ptr_eq(&self.state, &next),
            "Applied action"
        );
        self.state = next;
        self.published.send_replace(Arc::clone(&self.state));

        self.listeners.retain(|l| l.active.load(Ordering::Acquire));
        for registered in &mut self.listeners {
            registered.listener.on_change(&self.state);
        }
    }
}

/// Cloneable handle to the store actor
#[derive(Clone)]
pub struct Store {
    commands: mpsc::UnboundedSender<Command>,
    published: watch::Receiver<Arc<State>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("sessions", &self.published.borrow().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Store {
    /// Spawn a store with an empty state
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        Self::with_state(State::default())
    }

    /// Spawn a store starting from `initial`
    pub fn with_state(initial: State) -> Self {
        let initial = Arc::new(initial);
        let (commands, receiver) = mpsc::unbounded_channel();
        let (published, watcher) = watch::channel(Arc::clone(&initial));

        let actor = StoreActor {
            state: initial,
            commands: receiver,
            published,
            listeners: Vec::new(),
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            published: watcher,
        }
    }

    /// Queue an action
    ///
    /// Actions sent after the store has stopped are dropped.
    pub fn dispatch(&self, action: Action) {
        if self
            .commands
            .send(Command::Dispatch { action, ack: None })
            .is_err()
        {
            tracing::debug!("Dropping action, state store has stopped");
        }
    }

    /// Queue an action and wait until it has been applied and announced
    pub async fn apply(&self, action: Action) -> Result<Arc<State>> {
        let (ack, applied) = oneshot::channel();
        self.commands
            .send(Command::Dispatch {
                action,
                ack: Some(ack),
            })
            .map_err(|_| Error::StoreClosed)?;
        applied.await.map_err(|_| Error::StoreClosed)
    }

    /// Register a listener for every subsequent notification round
    pub fn subscribe(&self, listener: impl Listener + 'static) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        if self
            .commands
            .send(Command::Subscribe {
                listener: Box::new(listener),
                active: Arc::clone(&active),
            })
            .is_err()
        {
            active.store(false, Ordering::Release);
        }
        Subscription { active }
    }

    /// Latest applied snapshot
    pub fn get_state(&self) -> Arc<State> {
        Arc::clone(&self.published.borrow())
    }

    /// Receiver that observes every published snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<State>> {
        self.published.clone()
    }

    /// Wait until an entry reaches `done` or `failed`
    ///
    /// Returns `None` once the entry is absent, which includes the session
    /// having been removed; call this after the `startClone` has been applied.
    pub async fn wait_for_repo(&self, session_id: &str, url: &str) -> Option<RepoEntry> {
        let mut watcher = self.published.clone();
        let settled = watcher
            .wait_for(|state| match state.repo(session_id, url) {
                Some(entry) => entry.status.is_terminal(),
                None => true,
            })
            .await
            .map(|state| state.repo(session_id, url).cloned());

        match settled {
            Ok(entry) => entry,
            Err(_) => self.get_state().repo(session_id, url).cloned(),
        }
    }

    /// Stop the actor once the queued commands ahead of this one are handled
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
