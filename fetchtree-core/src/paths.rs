//! On-disk layout: `<root>/<session_id>/<slug>`

use std::path::{Path, PathBuf};

use crate::state::Slug;
use crate::{Error, Result};

/// Resolves session and checkout folders under the session data root
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every checkout of a session
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Folder of one checkout
    pub fn repo_dir(&self, session_id: &str, slug: &Slug) -> PathBuf {
        self.session_dir(session_id).join(slug.as_str())
    }

    /// Reject ids that would not map to exactly one folder under the root
    pub fn validate_session_id(session_id: &str) -> Result<()> {
        let valid = !session_id.is_empty()
            && session_id != "."
            && session_id != ".."
            && !session_id.contains(['/', '\\', '\0']);

        if valid {
            Ok(())
        } else {
            Err(Error::Other(format!("Invalid session id: {:?}", session_id)))
        }
    }
}
