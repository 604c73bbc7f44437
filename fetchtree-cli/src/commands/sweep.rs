//! Sweep command - Remove session folders that are not kept

use std::collections::BTreeSet;

use clap::Args;
use fetchtree_core::{sweep, Config, SessionPaths};

/// Arguments for the sweep command
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Session ids whose folders must be kept
    #[arg(short, long)]
    pub keep: Vec<String>,

    /// Only show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

impl SweepArgs {
    /// Execute the sweep command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        for id in &self.keep {
            SessionPaths::validate_session_id(id)?;
        }
        let root = config.sessions.data_dir.clone();
        let keep: BTreeSet<String> = self.keep.iter().cloned().collect();

        if verbose {
            tracing::info!(root = %root.display(), kept = keep.len(), "Sweeping session folders");
        }

        if self.dry_run {
            let mut entries = match tokio::fs::read_dir(&root).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("Nothing to sweep in {}", root.display());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                let name = entry.file_name();
                if is_dir && !name.to_str().is_some_and(|id| keep.contains(id)) {
                    println!("[Dry run] Would remove {}", entry.path().display());
                }
            }
            return Ok(());
        }

        let report = tokio::task::spawn_blocking(move || sweep(&root, &keep)).await?;
        for path in &report.removed {
            println!("Removed {}", path.display());
        }
        for path in &report.failed {
            println!("Failed to remove {}", path.display());
        }
        if report.is_empty() {
            println!("Nothing to sweep");
        }

        if !report.failed.is_empty() {
            anyhow::bail!("{} folder(s) could not be removed", report.failed.len());
        }
        Ok(())
    }
}
