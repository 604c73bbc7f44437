//! Run command - Serve clone requests read from stdin
//!
//! Each input line is `<session_id> <url>`. Requests are handled
//! concurrently and every one produces a single JSON line on stdout once it
//! settles. Sessions expire after the configured inactivity period and their
//! folders are collected.

use std::sync::Arc;

use clap::Args;
use fetchtree_core::{Config, Engine, RepoOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Remove every session folder when input ends
    #[arg(long)]
    pub cleanup: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let engine = Arc::new(Engine::with_git(config));
        if verbose {
            tracing::info!(
                data_dir = %config.sessions.data_dir.display(),
                max_age = ?config.sessions.max_age,
                "Waiting for requests on stdin"
            );
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut pending = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((session, url)) = line.split_once(char::is_whitespace) else {
                tracing::warn!(line = %line, "Expected `<session_id> <url>`");
                continue;
            };
            let session = session.to_string();
            let url = url.trim().to_string();

            let engine = Arc::clone(&engine);
            pending.spawn(async move {
                let outcome = engine.submit(&session, &url).await;
                println!("{}", report(&session, &url, outcome));
            });

            // reap finished requests without blocking on the rest
            while let Some(joined) = pending.try_join_next() {
                joined?;
            }
        }

        while let Some(joined) = pending.join_next().await {
            joined?;
        }

        if self.cleanup {
            for session in engine.store().get_state().session_ids() {
                engine
                    .store()
                    .apply(fetchtree_core::Action::remove_session(session))
                    .await?;
            }
            let report = fetchtree_core::sweep(
                engine.paths().root(),
                &engine.store().get_state().session_ids(),
            );
            tracing::info!(removed = report.removed.len(), "Cleaned up session folders");
        }

        engine.shutdown();
        Ok(())
    }
}

fn report(session: &str, url: &str, outcome: fetchtree_core::Result<RepoOutcome>) -> String {
    let value = match outcome {
        Ok(RepoOutcome::Done { files }) => serde_json::json!({
            "session_id": session,
            "url": url,
            "status": "done",
            "files": files,
        }),
        Ok(RepoOutcome::Failed) => serde_json::json!({
            "session_id": session,
            "url": url,
            "status": "failed",
        }),
        Ok(RepoOutcome::Expired) => serde_json::json!({
            "session_id": session,
            "url": url,
            "status": "expired",
        }),
        Err(e) => serde_json::json!({
            "session_id": session,
            "url": url,
            "status": "rejected",
            "error": e.to_string(),
        }),
    };
    value.to_string()
}
