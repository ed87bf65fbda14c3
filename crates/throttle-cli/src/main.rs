use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::task::LocalSet;
use tracing::{debug, info};

use throttle_core::{Concurrency, TaskOutcome, TaskQueue};

/// Run filesystem work through a bounded-concurrency queue.
#[derive(Parser, Debug)]
#[command(name = "throttle", about = "Bounded-concurrency task runner")]
struct Cli {
    /// Maximum tasks in flight: a positive number or "unlimited"
    #[arg(long, short = 'c', env = "THROTTLE_CONCURRENCY", default_value = "unlimited")]
    concurrency: Concurrency,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stat every path and print one JSON line per path, in argument order
    Stat {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct FileStat {
    size: u64,
    is_dir: bool,
}

#[derive(Debug, Serialize)]
struct StatLine<'a> {
    path: String,
    #[serde(flatten)]
    outcome: &'a TaskOutcome<FileStat, String>,
}

async fn stat_all(
    concurrency: Concurrency,
    paths: Vec<PathBuf>,
) -> Result<Vec<TaskOutcome<FileStat, String>>> {
    let queue: TaskQueue<FileStat, String> = TaskQueue::from_concurrency(concurrency);
    for path in paths {
        queue
            .submit_future(move || async move {
                debug!(path = %path.display(), "stat");
                tokio::fs::metadata(&path)
                    .await
                    .map(|meta| FileStat {
                        size: meta.len(),
                        is_dir: meta.is_dir(),
                    })
                    .map_err(|e| format!("{}: {e}", path.display()))
            })
            .context("failed to submit stat task")?;
    }
    let outcomes = queue
        .finished()
        .context("failed to register completion handler")?
        .await
        .context("queue dropped before completion")?;
    Ok(outcomes)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Stat { paths } => {
            info!(concurrency = %cli.concurrency, paths = paths.len(), "stat");
            let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
            let outcomes = LocalSet::new()
                .run_until(stat_all(cli.concurrency, paths))
                .await?;

            let mut failed = 0usize;
            for (path, outcome) in names.into_iter().zip(&outcomes) {
                if outcome.is_error() {
                    failed += 1;
                }
                let line = StatLine { path, outcome };
                println!("{}", serde_json::to_string(&line)?);
            }
            if failed > 0 {
                info!(failed, "some paths could not be read");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
