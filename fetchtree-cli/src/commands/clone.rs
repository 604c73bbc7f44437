//! Clone command - Fetch repositories into one session and list their files

use std::sync::Arc;

use clap::Args;
use fetchtree_core::{Config, Engine, RepoOutcome};
use tokio::task::JoinSet;

/// Arguments for the clone command
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Repository URLs to clone
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Session to clone into (defaults to a per-process id)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Print the final session state as JSON instead of file lists
    #[arg(long)]
    pub json: bool,
}

impl CloneArgs {
    /// Execute the clone command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let session = self
            .session
            .clone()
            .unwrap_or_else(|| format!("cli-{}", std::process::id()));

        if verbose {
            tracing::info!(
                session = %session,
                urls = self.urls.len(),
                data_dir = %config.sessions.data_dir.display(),
                "Starting clone"
            );
        }

        let engine = Arc::new(Engine::with_git(config));

        let mut pending = JoinSet::new();
        for (index, url) in self.urls.iter().enumerate() {
            let engine = Arc::clone(&engine);
            let session = session.clone();
            let url = url.clone();
            pending.spawn(async move {
                let outcome = engine.submit(&session, &url).await;
                (index, url, outcome)
            });
        }

        let mut results = Vec::with_capacity(self.urls.len());
        while let Some(joined) = pending.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut failures = 0;
        if self.json {
            let state = engine.store().get_state();
            println!("{}", serde_json::to_string_pretty(&*state)?);
            failures = results
                .iter()
                .filter(|(_, _, outcome)| !matches!(outcome, Ok(RepoOutcome::Done { .. })))
                .count();
        } else {
            for (_, url, outcome) in &results {
                match outcome {
                    Ok(RepoOutcome::Done { files }) => {
                        println!("{} ({} files)", url, files.len());
                        for file in files {
                            println!("  {}", file);
                        }
                    }
                    Ok(RepoOutcome::Failed) => {
                        failures += 1;
                        println!("{} failed", url);
                    }
                    Ok(RepoOutcome::Expired) => {
                        failures += 1;
                        println!("{} expired before finishing", url);
                    }
                    Err(e) => {
                        failures += 1;
                        println!("{} rejected: {}", url, e);
                    }
                }
            }
            println!();
            println!(
                "Checkouts in {}",
                engine.paths().session_dir(&session).display()
            );
        }

        engine.shutdown();

        if failures > 0 {
            anyhow::bail!("{} of {} repositories failed", failures, self.urls.len());
        }
        Ok(())
    }
}
