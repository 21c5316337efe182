//! Batch coordination
//!
//! A batch builds a queue (failed records to retry, interrupted work, new input),
//! opens a batch record, drives every item through the stage runner with
//! bounded concurrency and commits aggregates as outcomes arrive. One file's
//! failure never stops the others.

use super::stage::{StageRunner, WorkItem};
use crate::config::Config;
use crate::dedupe::{Claim, DuplicateCheck, DuplicateDetector};
use crate::error::{Error, Result};
use crate::hash::hash_file;
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use crate::source::{DocumentSource, SourceFile};
use crate::tracking::{
    BatchCounts, BatchStatus, FileRecord, FileStatus, NewFile, TrackingStore, TransitionFields,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum number of error messages kept in a batch's error summary
const ERROR_SUMMARY_LIMIT: usize = 5;

/// Knobs for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Report already-tracked content as skipped instead of driving it forward
    pub skip_duplicates: bool,
    /// Outcomes per aggregate commit
    pub batch_size: usize,
    /// Queue retryable failed records ahead of new input
    pub resume_failed: bool,
    pub max_retries: i32,
    /// Queue records left in pending, uploaded or processing
    pub resume_incomplete: bool,
    /// Revert `processing` records before building the queue
    pub reset_stuck: bool,
    /// Files in flight at once
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            batch_size: 10,
            resume_failed: false,
            max_retries: 3,
            resume_incomplete: false,
            reset_stuck: true,
            concurrency: 1,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_duplicates: config.processing.skip_duplicates,
            batch_size: config.processing.batch_size,
            resume_failed: config.processing.resume_failed,
            max_retries: config.tracking.max_retries,
            resume_incomplete: false,
            reset_stuck: config.tracking.reset_stuck,
            concurrency: config.processing.concurrency,
        }
    }
}

/// How one queued file ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
    RetryLimitExceeded,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::RetryLimitExceeded => write!(f, "retry_limit_exceeded"),
        }
    }
}

/// Per-file result inside a batch summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub name: String,
    pub source_path: String,
    pub status: OutcomeStatus,
    pub file_id: Option<String>,
    pub content_hash: Option<String>,
    pub blob_url: Option<String>,
    pub error: Option<String>,
}

impl FileOutcome {
    fn from_record(record: &FileRecord, status: OutcomeStatus) -> Self {
        Self {
            name: record.file_name.clone(),
            source_path: record.source_path.clone(),
            status,
            file_id: Some(record.file_id.clone()),
            content_hash: Some(record.content_hash.clone()),
            blob_url: record.blob_url.clone(),
            error: record.error_message.clone(),
        }
    }

    /// Outcome of a driven record: success only when it reached `embedded`
    fn finished(record: &FileRecord) -> Self {
        match record.status {
            FileStatus::Embedded => Self::from_record(record, OutcomeStatus::Success),
            _ => Self::from_record(record, OutcomeStatus::Failed),
        }
    }

    fn failed(name: &str, source_path: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            source_path: source_path.to_string(),
            status: OutcomeStatus::Failed,
            file_id: None,
            content_hash: None,
            blob_url: None,
            error: Some(error),
        }
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// One entry per processed item, in queue order
    pub outcomes: Vec<FileOutcome>,
}

/// Work queued for a batch
#[derive(Debug)]
enum QueueItem {
    /// A failed record, moved back to `pending` only when its turn comes
    Retry(FileRecord),
    /// A record already tracked: re-fetch from its source path and continue
    Resume(FileRecord),
    /// A failed record whose retries are used up
    Exhausted(FileRecord),
    /// A file from the input list
    New(SourceFile),
}

impl QueueItem {
    fn label(&self) -> &str {
        match self {
            QueueItem::Retry(r) | QueueItem::Resume(r) | QueueItem::Exhausted(r) => &r.file_name,
            QueueItem::New(f) => &f.name,
        }
    }

    fn source_path(&self) -> &str {
        match self {
            QueueItem::Retry(r) | QueueItem::Resume(r) | QueueItem::Exhausted(r) => {
                &r.source_path
            }
            QueueItem::New(f) => &f.path,
        }
    }
}

/// Result of moving a failed record back to `pending`
enum RetryClaim {
    Claimed(FileRecord),
    /// Not retried here; the outcome to report instead
    Settled(FileOutcome),
}

/// Drives files through the pipeline as a batch
pub struct BatchCoordinator {
    store: TrackingStore,
    detector: DuplicateDetector,
    source: Arc<dyn DocumentSource>,
    runner: StageRunner,
    cancel: CancellationToken,
    show_progress: bool,
}

impl BatchCoordinator {
    pub fn new(store: TrackingStore, source: Arc<dyn DocumentSource>, runner: StageRunner) -> Self {
        Self {
            detector: DuplicateDetector::new(store.clone()),
            store,
            source,
            runner,
            cancel: CancellationToken::new(),
            show_progress: false,
        }
    }

    /// Stop starting new files once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// List candidate files from the source
    pub async fn discover(&self, path: &str, extensions: &[String]) -> Result<Vec<SourceFile>> {
        let files = self
            .runner
            .bounded("list", self.source.list(path, extensions))
            .await?;
        info!("Found {} file(s) to consider", files.len());
        Ok(files)
    }

    /// Retry failed records only
    ///
    /// Records whose retries are used up are reported as
    /// `retry_limit_exceeded` and count as failures of this batch.
    pub async fn retry_failed(&self, options: &BatchOptions) -> Result<BatchSummary> {
        let options = BatchOptions {
            resume_failed: true,
            resume_incomplete: false,
            ..options.clone()
        };
        self.execute(Vec::new(), &options, true).await
    }

    /// Process `files` (plus resumable records, per `options`) as one batch
    pub async fn run(&self, files: Vec<SourceFile>, options: &BatchOptions) -> Result<BatchSummary> {
        self.execute(files, options, false).await
    }

    async fn execute(
        &self,
        files: Vec<SourceFile>,
        options: &BatchOptions,
        report_exhausted: bool,
    ) -> Result<BatchSummary> {
        if options.batch_size == 0 || options.concurrency == 0 {
            return Err(Error::Config(
                "batch_size and concurrency must be positive".to_string(),
            ));
        }

        let queue = self.build_queue(files, options, report_exhausted).await?;
        let batch = self.store.start_batch(queue.len() as i64).await?;
        let total = queue.len();

        let progress = if self.show_progress {
            start_progress_bar(total, "Processing files")
        } else {
            None
        };

        let mut results = stream::iter(queue.into_iter().enumerate())
            .map(|(idx, item)| async move {
                if self.cancel.is_cancelled() {
                    return (idx, None);
                }
                (idx, Some(self.process_item(item, options).await))
            })
            .buffer_unordered(options.concurrency);

        let mut counts = BatchCounts::default();
        let mut outcomes: Vec<(usize, FileOutcome)> = Vec::with_capacity(total);
        let mut since_commit = 0usize;

        while let Some((idx, outcome)) = results.next().await {
            let Some(outcome) = outcome else {
                continue;
            };

            match outcome.status {
                OutcomeStatus::Success => counts.successful += 1,
                OutcomeStatus::Skipped => counts.skipped += 1,
                OutcomeStatus::Failed | OutcomeStatus::RetryLimitExceeded => counts.failed += 1,
            }
            advance_progress(&progress, &outcome.name);
            outcomes.push((idx, outcome));

            since_commit += 1;
            if since_commit >= options.batch_size {
                self.store
                    .update_batch_progress(&batch.batch_id, counts)
                    .await?;
                since_commit = 0;
            }
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        let outcomes: Vec<FileOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        let cancelled = self.cancel.is_cancelled() && outcomes.len() < total;
        let status = if cancelled {
            BatchStatus::Cancelled
        } else if counts.failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Partial
        };

        let error_summary = summarize_errors(&outcomes);

        let closed = self
            .store
            .finish_batch(&batch.batch_id, status, counts, error_summary.as_deref())
            .await?;
        finish_progress(progress, &format!("Batch {}", status));

        info!(
            "Batch {} {}: {} succeeded, {} failed, {} skipped of {}",
            closed.batch_id, status, counts.successful, counts.failed, counts.skipped, total
        );

        Ok(BatchSummary {
            batch_id: closed.batch_id,
            status,
            total,
            successful: counts.successful as usize,
            failed: counts.failed as usize,
            skipped: counts.skipped as usize,
            outcomes,
        })
    }

    async fn build_queue(
        &self,
        files: Vec<SourceFile>,
        options: &BatchOptions,
        report_exhausted: bool,
    ) -> Result<Vec<QueueItem>> {
        if options.reset_stuck {
            self.store.reset_stuck(FileStatus::Processing).await?;
        }

        let mut queue = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();

        if options.resume_failed {
            for record in self.store.list_by_status(FileStatus::Failed, None).await? {
                if record.retry_count < options.max_retries {
                    queued.insert(record.file_id.clone());
                    queue.push(QueueItem::Retry(record));
                } else if report_exhausted {
                    queued.insert(record.file_id.clone());
                    queue.push(QueueItem::Exhausted(record));
                } else {
                    debug!(file_id = %record.file_id, "Retries used up, leaving failed");
                }
            }
        }

        if options.resume_incomplete {
            for status in [
                FileStatus::Pending,
                FileStatus::Uploaded,
                FileStatus::Processing,
            ] {
                for record in self.store.list_by_status(status, None).await? {
                    if queued.insert(record.file_id.clone()) {
                        queue.push(QueueItem::Resume(record));
                    }
                }
            }
        }

        queue.extend(files.into_iter().map(QueueItem::New));
        debug!("Queued {} item(s)", queue.len());
        Ok(queue)
    }

    async fn process_item(&self, item: QueueItem, options: &BatchOptions) -> FileOutcome {
        let label = item.label().to_string();
        let source_path = item.source_path().to_string();

        let result = match item {
            QueueItem::Exhausted(record) => {
                warn!(file_id = %record.file_id, "Retry limit reached ({})", record.retry_count);
                Ok(FileOutcome::from_record(
                    &record,
                    OutcomeStatus::RetryLimitExceeded,
                ))
            }
            QueueItem::Retry(record) => self.process_retry(record, options).await,
            QueueItem::Resume(record) => self.process_resume(record).await,
            QueueItem::New(file) => self.process_new(&file, options).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_collaborator() => {
                warn!("Failed to process {}: {}", label, e);
                FileOutcome::failed(&label, &source_path, e.to_string())
            }
            Err(e) => {
                error!("Tracking error while processing {}: {}", label, e);
                FileOutcome::failed(&label, &source_path, e.to_string())
            }
        }
    }

    /// Fetch a source file into `dir` and fingerprint the local copy
    async fn fetch(&self, path: &str, name: &str, dir: &Path) -> Result<(PathBuf, String)> {
        let local = dir.join(name);
        self.runner
            .bounded("download", self.source.download(path, &local))
            .await?;
        let hash = hash_file(&local).await?;
        Ok((local, hash))
    }

    async fn process_new(&self, file: &SourceFile, options: &BatchOptions) -> Result<FileOutcome> {
        let tmp = tempfile::tempdir()?;
        let (local, hash) = self.fetch(&file.path, &file.name, tmp.path()).await?;

        if let DuplicateCheck::Duplicate { existing, .. } = self.detector.check(&hash).await? {
            return self.handle_known(existing, &local, options).await;
        }

        let metadata_json = file
            .content_type()
            .map(|mime| serde_json::json!({ "content_type": mime }).to_string());
        let new_file = NewFile {
            content_hash: hash,
            file_name: file.name.clone(),
            size_bytes: file.size as i64,
            file_type: file.file_type(),
            source_path: file.path.clone(),
            source_modified_at: file.modified_at.clone(),
            metadata_json,
        };

        match self.detector.claim(&new_file).await? {
            Claim::Claimed(record) => {
                info!(file_id = %record.file_id, "Tracking new file {}", record.file_name);
                self.drive(record, &local).await
            }
            Claim::Duplicate { existing, .. } => {
                debug!(file_id = %existing.file_id, "Claimed concurrently by another run");
                Ok(FileOutcome::from_record(&existing, OutcomeStatus::Skipped))
            }
        }
    }

    /// Content that is already tracked under `existing`
    ///
    /// Only a `failed` record is driven again here. Unfinished records belong
    /// to whichever run is working on them and resume through
    /// `resume_incomplete`.
    async fn handle_known(
        &self,
        existing: FileRecord,
        local: &Path,
        options: &BatchOptions,
    ) -> Result<FileOutcome> {
        if options.skip_duplicates || existing.status == FileStatus::Embedded {
            debug!(file_id = %existing.file_id, "Duplicate content, skipping");
            return Ok(FileOutcome::from_record(&existing, OutcomeStatus::Skipped));
        }
        if existing.status != FileStatus::Failed {
            debug!(
                file_id = %existing.file_id,
                "Known content is {}, leaving it to its run", existing.status
            );
            return Ok(FileOutcome::from_record(&existing, OutcomeStatus::Skipped));
        }

        match self.claim_retry(&existing, options).await? {
            RetryClaim::Claimed(record) => self.drive(record, local).await,
            RetryClaim::Settled(outcome) => Ok(outcome),
        }
    }

    /// Move a failed record back to `pending`, or say why it stays put
    async fn claim_retry(
        &self,
        record: &FileRecord,
        options: &BatchOptions,
    ) -> Result<RetryClaim> {
        match self.store.retry(&record.file_id, options.max_retries).await {
            Ok(pending) => Ok(RetryClaim::Claimed(pending)),
            Err(Error::RetryLimitExceeded { .. }) => Ok(RetryClaim::Settled(
                FileOutcome::from_record(record, OutcomeStatus::RetryLimitExceeded),
            )),
            // Another run retried it first
            Err(Error::InvalidTransition { .. }) | Err(Error::UnknownFile(_)) => {
                debug!(file_id = %record.file_id, "No longer failed, not retrying");
                Ok(RetryClaim::Settled(FileOutcome::from_record(
                    record,
                    OutcomeStatus::Skipped,
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn process_retry(
        &self,
        record: FileRecord,
        options: &BatchOptions,
    ) -> Result<FileOutcome> {
        match self.claim_retry(&record, options).await? {
            RetryClaim::Claimed(pending) => {
                info!(
                    file_id = %pending.file_id,
                    "Retrying {} (attempt {})", pending.file_name, pending.retry_count
                );
                self.process_resume(pending).await
            }
            RetryClaim::Settled(outcome) => Ok(outcome),
        }
    }

    /// Re-fetch a tracked record from its source path and continue it
    async fn process_resume(&self, record: FileRecord) -> Result<FileOutcome> {
        let tmp = tempfile::tempdir()?;
        let fetched = self
            .fetch(&record.source_path, &record.file_name, tmp.path())
            .await
            .and_then(|(local, hash)| {
                if hash == record.content_hash {
                    Ok(local)
                } else {
                    Err(Error::HashMismatch {
                        path: record.source_path.clone(),
                        expected: record.content_hash.clone(),
                        actual: hash,
                    })
                }
            });

        match fetched {
            Ok(local) => self.drive(record, &local).await,
            Err(e) if e.is_collaborator() => {
                warn!(file_id = %record.file_id, "Cannot resume: {}", e);
                let failed = self
                    .store
                    .transition(
                        &record.file_id,
                        FileStatus::Failed,
                        TransitionFields::error(e.to_string()),
                    )
                    .await?;
                Ok(FileOutcome::from_record(&failed, OutcomeStatus::Failed))
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&self, record: FileRecord, local: &Path) -> Result<FileOutcome> {
        let mut work = WorkItem::new(local, &record);
        let finished = self.runner.run_to_completion(record, &mut work).await?;
        Ok(FileOutcome::finished(&finished))
    }
}

fn summarize_errors(outcomes: &[FileOutcome]) -> Option<String> {
    let failures: Vec<String> = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o.status,
                OutcomeStatus::Failed | OutcomeStatus::RetryLimitExceeded
            )
        })
        .map(|o| match &o.error {
            Some(e) => format!("{}: {}", o.name, e),
            None => format!("{}: {}", o.name, o.status),
        })
        .collect();

    if failures.is_empty() {
        return None;
    }

    let mut summary = failures
        .iter()
        .take(ERROR_SUMMARY_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if failures.len() > ERROR_SUMMARY_LIMIT {
        summary.push_str(&format!(
            "; and {} more",
            failures.len() - ERROR_SUMMARY_LIMIT
        ));
    }
    Some(summary)
}
