//! Fetchtree Core - Per-session git checkout orchestration
//!
//! This crate keeps, for every client session, the set of repositories the
//! session asked for and where each one is in its clone pipeline. All state
//! lives in a single store driven by pure reducer transitions; clones, file
//! listings and folder cleanup run as side effects reacting to state changes.

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod git;
pub mod lister;
pub mod paths;
pub mod reactor;
pub mod reducer;
pub mod state;
pub mod store;
pub mod timers;

pub use action::{Action, ActionKind, RepoUpdate};
pub use config::Config;
pub use engine::{Engine, RepoOutcome, FILES_ROUTE};
pub use error::{Error, Result};
pub use gc::{sweep, SweepReport, Sweeper};
pub use git::{CloneRunner, GitCli, ProcessOutcome, RepoUrl, Vcs};
pub use lister::{list_files, FileLister};
pub use paths::SessionPaths;
pub use reactor::{plan_effects, Effect, Reactor};
pub use reducer::reduce;
pub use state::{RepoEntry, RepoStatus, Session, SessionId, Slug, State, TimerHandle};
pub use store::{Listener, Store, Subscription};
pub use timers::{ExpiryWatch, SessionTimers};
