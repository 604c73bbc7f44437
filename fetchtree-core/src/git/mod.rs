//! Git operations for fetchtree
//!
//! This module provides clone URL validation, the external process
//! abstraction used to clone and refresh checkouts, and the runner that
//! drives it from store effects.

mod runner;
mod url;
mod vcs;

pub use runner::CloneRunner;
pub use url::RepoUrl;
pub use vcs::{GitCli, ProcessOutcome, Vcs};
