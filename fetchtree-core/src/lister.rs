//! File listing for finished checkouts

use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::action::{Action, RepoUpdate};
use crate::paths::SessionPaths;
use crate::state::Slug;
use crate::store::Store;
use crate::{Error, Result};

/// Version control metadata directory excluded from listings
const VCS_DIR: &str = ".git";

/// List every regular file of the checkout `slug` inside `session_dir`
///
/// Hidden files are included, `.git` directories are pruned, symlinks are
/// not followed. Paths are relative to `session_dir` (so they start with the
/// slug), use `/` separators and come out in file-name order.
pub fn list_files(session_dir: &Path, slug: &Slug) -> Result<Vec<String>> {
    let repo_dir = session_dir.join(slug.as_str());
    let walker = WalkDir::new(&repo_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == VCS_DIR));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(session_dir).map_err(|_| {
            Error::Other(format!(
                "{} is outside {}",
                entry.path().display(),
                session_dir.display()
            ))
        })?;
        files.push(to_slash(relative));
    }

    Ok(files)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lists checkouts that reached `clone_done` and reports `done` or `failed`
#[derive(Debug, Clone)]
pub struct FileLister {
    store: Store,
    paths: SessionPaths,
}

impl FileLister {
    pub fn new(store: Store, paths: SessionPaths) -> Self {
        Self { store, paths }
    }

    pub fn start(&self, session_id: &str, url: &str, slug: Option<Slug>) {
        let Some(slug) = slug else {
            tracing::error!(
                session_id = %session_id,
                url = %url,
                "No slug when trying to list files"
            );
            self.store
                .dispatch(Action::set_repo_status(session_id, RepoUpdate::failed(url)));
            return;
        };

        let store = self.store.clone();
        let session_dir = self.paths.session_dir(session_id);
        let session_id = session_id.to_string();
        let url = url.to_string();
        tokio::spawn(async move {
            let listed = tokio::task::spawn_blocking(move || list_files(&session_dir, &slug))
                .await
                .map_err(|e| Error::Other(format!("File listing task failed: {}", e)))
                .and_then(|r| r);

            let update = match listed {
                Ok(files) => {
                    tracing::debug!(
                        session_id = %session_id,
                        url = %url,
                        count = files.len(),
                        "Listed files"
                    );
                    RepoUpdate::done(&url, files)
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        url = %url,
                        error = %e,
                        "Failed to list files"
                    );
                    RepoUpdate::failed(&url)
                }
            };
            store.dispatch(Action::set_repo_status(session_id, update));
        });
    }
}
