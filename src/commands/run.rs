//! Run and retry commands implementation

use crate::error::Result;
use crate::pipeline::{BatchCoordinator, BatchOptions, BatchSummary, OutcomeStatus};
use crate::tracking::BatchStatus;
use tracing::info;

/// One `run` invocation
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Directory to list, relative to the source root
    pub path: String,
    /// Extension filter; empty takes everything
    pub extensions: Vec<String>,
    pub options: BatchOptions,
}

/// Discover files and process them as one batch
pub async fn cmd_run(coordinator: &BatchCoordinator, request: RunRequest) -> Result<BatchSummary> {
    info!("Starting batch over {:?}", request.path);
    let files = coordinator
        .discover(&request.path, &request.extensions)
        .await?;
    coordinator.run(files, &request.options).await
}

/// Retry every failed record that still has retries left
pub async fn cmd_retry(
    coordinator: &BatchCoordinator,
    options: &BatchOptions,
) -> Result<BatchSummary> {
    info!("Retrying failed files (max retries {})", options.max_retries);
    coordinator.retry_failed(options).await
}

/// Print a batch summary to console
pub fn print_summary(summary: &BatchSummary) {
    let icon = match summary.status {
        BatchStatus::Completed => "✓",
        BatchStatus::Cancelled => "⏹",
        _ => "⚠",
    };
    println!("\n{} Batch {} {}", icon, summary.batch_id, summary.status);
    println!("  Total: {}", summary.total);
    println!("  Successful: {}", summary.successful);
    println!("  Skipped: {}", summary.skipped);
    println!("  Failed: {}", summary.failed);

    let failures: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| {
            matches!(
                o.status,
                OutcomeStatus::Failed | OutcomeStatus::RetryLimitExceeded
            )
        })
        .collect();

    if !failures.is_empty() {
        println!("\nFailures:");
        for outcome in failures {
            println!(
                "  • {} [{}] {}",
                outcome.name,
                outcome.status,
                outcome.error.as_deref().unwrap_or("")
            );
        }
    }
}
