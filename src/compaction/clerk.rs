//! Mailbox actor and job coordinator.
//!
//! One clerk serves one journal owner. Requests arrive asynchronously on a
//! bounded mailbox and are handled strictly serially, so a `stop` queued
//! behind a running job is honored between jobs and never interrupts one.
//! All mutable state lives inside the worker task.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use futures::{
    SinkExt, StreamExt,
    channel::{mpsc, oneshot},
};

use super::{
    BATCH_SIZE, Candidate, DEFAULT_MAX_RUN_LENGTH, SAMPLE_SIZE, error::CompactionError, planner,
    rewriter, scorer, sort_run,
};
use crate::{
    codec::StrategyMap,
    journal::{
        JournalConfig, JournalFile, JournalStore,
        hashtable::{self, HashTree, IndexTable},
    },
    ledger::LedgerView,
    manifest::{JournalController, ManifestEntry},
    observability::{log_debug, log_error, log_info},
};

/// Requests queued ahead of a busy clerk before senders start waiting.
const MAILBOX_DEPTH: usize = 16;

/// Factory producing the ledger view a job runs against; invoked once at
/// job start, typically snapshotting the ledger.
pub type LedgerSnapshotFn = Box<
    dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<LedgerView, CompactionError>> + Send>>
        + Send,
>;

/// One compaction request.
pub struct CompactRequest {
    snapshot: LedgerSnapshotFn,
    timeout: Option<Duration>,
}

impl CompactRequest {
    /// Build a request around a ledger snapshot factory.
    pub fn new(snapshot: LedgerSnapshotFn) -> Self {
        Self {
            snapshot,
            timeout: None,
        }
    }

    /// Build a request from an already-taken ledger view.
    pub fn from_view(view: LedgerView) -> Self {
        Self::new(Box::new(move || Box::pin(async move { Ok(view) })))
    }

    /// Attach a wall-clock budget. Accepted and logged for API stability;
    /// in-flight work is not bounded by it today.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Clerk construction options.
pub struct ClerkOptions<S, C> {
    store: S,
    controller: Arc<C>,
    journal: JournalConfig,
    max_run_length: usize,
    reload_strategy: StrategyMap,
}

impl<S, C> ClerkOptions<S, C> {
    /// Options with the default run cap and reload strategy.
    pub fn new(store: S, controller: Arc<C>, journal: JournalConfig) -> Self {
        Self {
            store,
            controller,
            journal,
            max_run_length: DEFAULT_MAX_RUN_LENGTH,
            reload_strategy: StrategyMap::default(),
        }
    }

    /// Cap the number of files compacted in one run.
    pub fn with_max_run_length(mut self, max_run_length: usize) -> Self {
        self.max_run_length = max_run_length.max(1);
        self
    }

    /// Override the per-tag reload strategy.
    pub fn with_reload_strategy(mut self, reload_strategy: StrategyMap) -> Self {
        self.reload_strategy = reload_strategy;
        self
    }
}

enum ClerkMessage {
    Compact(CompactRequest),
    HashtableCalc {
        tree: HashTree,
        start_pos: u64,
        reply: oneshot::Sender<IndexTable>,
    },
    Stop,
}

/// Handle to a clerk worker. Cheap to clone; dropping every handle closes
/// the mailbox and stops the worker between jobs.
#[derive(Clone)]
pub struct Clerk {
    tx: mpsc::Sender<ClerkMessage>,
}

impl Clerk {
    /// Create a clerk and its worker without spawning it, for callers that
    /// run the worker on their own executor.
    pub fn with_worker<S, C>(options: ClerkOptions<S, C>) -> (Self, ClerkWorker<S, C>)
    where
        S: JournalStore,
        C: JournalController<S::File>,
    {
        let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
        (
            Self { tx },
            ClerkWorker {
                rx,
                store: options.store,
                controller: options.controller,
                journal: options.journal,
                max_run_length: options.max_run_length,
                strategies: options.reload_strategy,
            },
        )
    }

    /// Create a clerk and spawn its worker on the tokio runtime.
    #[cfg(feature = "tokio")]
    pub fn spawn<S, C>(options: ClerkOptions<S, C>) -> (Self, tokio::task::JoinHandle<()>)
    where
        S: JournalStore,
        C: JournalController<S::File> + 'static,
    {
        let (clerk, worker) = Self::with_worker(options);
        (clerk, tokio::spawn(worker.run()))
    }

    /// Queue a compaction job. Fire-and-forget: the result is published to
    /// the journal controller through its own callbacks.
    pub async fn compact(&self, request: CompactRequest) -> Result<(), CompactionError> {
        let mut tx = self.tx.clone();
        tx.send(ClerkMessage::Compact(request))
            .await
            .map_err(|_| CompactionError::MailboxClosed)
    }

    /// Compute the hash index table for `tree`, laid out from `start_pos`.
    /// The worker terminates after replying; this lifecycle is for clerks
    /// dedicated to a single computation.
    pub async fn hashtable_calc(
        &self,
        tree: HashTree,
        start_pos: u64,
    ) -> Result<IndexTable, CompactionError> {
        let (reply, rx) = oneshot::channel();
        let mut tx = self.tx.clone();
        tx.send(ClerkMessage::HashtableCalc {
            tree,
            start_pos,
            reply,
        })
        .await
        .map_err(|_| CompactionError::MailboxClosed)?;
        rx.await.map_err(|_| CompactionError::MailboxClosed)
    }

    /// Orderly shutdown. In-flight compaction is not interrupted; a worker
    /// that already stopped is not an error.
    pub async fn stop(&self) {
        let mut tx = self.tx.clone();
        let _ = tx.send(ClerkMessage::Stop).await;
    }
}

/// The worker task owning all clerk state.
pub struct ClerkWorker<S, C> {
    rx: mpsc::Receiver<ClerkMessage>,
    store: S,
    controller: Arc<C>,
    journal: JournalConfig,
    max_run_length: usize,
    strategies: StrategyMap,
}

impl<S, C> ClerkWorker<S, C>
where
    S: JournalStore,
    C: JournalController<S::File>,
{
    /// Process messages until stopped, the mailbox closes, or a hashtable
    /// computation completes.
    pub async fn run(mut self) {
        while let Some(message) = self.rx.next().await {
            match message {
                ClerkMessage::Compact(request) => {
                    if let Err(err) = self.run_job(request).await {
                        log_error!(
                            component = "clerk",
                            event = "job_failed",
                            error = %err,
                        );
                    }
                }
                ClerkMessage::HashtableCalc {
                    tree,
                    start_pos,
                    reply,
                } => {
                    let _ = reply.send(hashtable::calculate(&tree, start_pos));
                    break;
                }
                ClerkMessage::Stop => break,
            }
        }
        log_debug!(component = "clerk", event = "worker_stopped");
    }

    async fn run_job(&self, request: CompactRequest) -> Result<(), CompactionError> {
        log_info!(
            component = "clerk",
            event = "job_started",
            timeout = ?request.timeout,
        );
        let manifest = self.controller.get_manifest().await?;
        // The head entry is the active write tip and is never compacted.
        let tail = manifest.split_first().map(|(_, rest)| rest).unwrap_or(&[]);
        let view = (request.snapshot)().await?;

        let mut candidates = Vec::with_capacity(tail.len());
        for entry in tail {
            let perc =
                scorer::score_file(entry.file.as_ref(), &view, SAMPLE_SIZE, BATCH_SIZE).await;
            log_debug!(
                component = "clerk",
                event = "file_scored",
                file = %entry.filename.display(),
                compaction_perc = perc,
            );
            candidates.push(Candidate::new(
                entry.start_sqn,
                entry.filename.clone(),
                Arc::clone(&entry.file),
                perc,
            ));
        }

        let mut run = planner::plan(&candidates, self.max_run_length);
        let score = planner::score_run(&run, self.max_run_length);
        if score <= 0.0 {
            log_info!(component = "clerk", event = "compaction_idle", score);
            self.controller.compaction_complete().await;
            return Ok(());
        }
        sort_run(&mut run);
        log_info!(
            component = "clerk",
            event = "run_selected",
            files = run.len(),
            score,
            first_sqn = run[0].low_sqn,
        );

        let output =
            rewriter::rewrite_run(&self.store, &self.journal, &run, &self.strategies, &view)
                .await?;
        let consumed: Vec<ManifestEntry<S::File>> = run
            .iter()
            .map(|candidate| {
                ManifestEntry::new(
                    candidate.low_sqn,
                    candidate.filename.clone(),
                    Arc::clone(&candidate.file),
                )
            })
            .collect();
        let files_written = output.slice.len();
        let manifest_sqn = self
            .controller
            .update_manifest(output.slice, consumed)
            .await?;
        log_info!(
            component = "clerk",
            event = "manifest_updated",
            manifest_sqn,
            files_written,
            prompt_delete = output.prompt_delete,
        );
        self.controller.compaction_complete().await;

        if output.prompt_delete {
            for candidate in &run {
                candidate.file.delete_pending(manifest_sqn).await;
            }
        }
        Ok(())
    }
}
