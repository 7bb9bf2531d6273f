use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rusqlite::Connection;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{self, ListingStatus};
use crate::enrich::JelTable;
use crate::errors::{IngestError, IngestResult};
use crate::paper::{build_entry, decompress, PaperEntry};
use crate::redif::read_document;
use crate::transport::{self, Scheme, Transport};

/// Outcome counts of one committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTally {
    pub ok: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub batches: Vec<BatchTally>,
}

impl RunStats {
    pub fn ok(&self) -> usize {
        self.batches.iter().map(|b| b.ok).sum()
    }

    pub fn total(&self) -> usize {
        self.batches.iter().map(|b| b.total).sum()
    }
}

/// Result of fetching and processing one listing document.
struct DocumentOutcome {
    url: String,
    result: IngestResult<Vec<PaperEntry>>,
}

/// Drives listings through fetch, parse, enrich and store.
///
/// Downloads run concurrently, capped separately for FTP and HTTP; all
/// database writes happen on the caller's task.
pub struct Ingestor<T> {
    transport: Arc<T>,
    batch_size: usize,
    timeout: Duration,
    ftp_slots: Arc<Semaphore>,
    http_slots: Arc<Semaphore>,
}

impl<T: Transport + 'static> Ingestor<T> {
    pub fn new(settings: &Settings, transport: T) -> Self {
        Ingestor {
            transport: Arc::new(transport),
            batch_size: settings.batch_size.max(1),
            timeout: settings.timeout(),
            ftp_slots: Arc::new(Semaphore::new(settings.ftp_workers.max(1))),
            http_slots: Arc::new(Semaphore::new(settings.http_workers.max(1))),
        }
    }

    /// Process every listing currently in `status`, one transaction per batch.
    pub async fn run(&self, conn: &Connection, status: ListingStatus) -> IngestResult<RunStats> {
        let jel = Arc::new(db::fetch_jel_codes(conn)?);
        let mut urls = db::fetch_listings(conn, status)?;
        if urls.is_empty() {
            return Err(IngestError::Validation(format!(
                "no listings with status {:?}",
                status
            )));
        }
        urls.shuffle(&mut rand::thread_rng());

        let n_batches = urls.len().div_ceil(self.batch_size);
        info!(
            "{} listings in {} batches ({} JEL codes loaded)",
            urls.len(),
            n_batches,
            jel.len()
        );

        let mut stats = RunStats::default();
        for (i, batch) in urls.chunks(self.batch_size).enumerate() {
            info!("Downloading batch {}/{}...", i + 1, n_batches);
            let tally = self.run_batch(conn, batch, &jel).await?;
            info!(
                "{} out of {} records updated successfully",
                tally.ok, tally.total
            );
            stats.batches.push(tally);
        }
        Ok(stats)
    }

    async fn run_batch(
        &self,
        conn: &Connection,
        batch: &[String],
        jel: &Arc<JelTable>,
    ) -> IngestResult<BatchTally> {
        let pb = ProgressBar::new(batch.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let (sender, mut receiver) = mpsc::channel::<DocumentOutcome>(batch.len().max(1));

        for url in batch {
            let url = url.clone();
            let transport = Arc::clone(&self.transport);
            let jel = Arc::clone(jel);
            let slots = match transport::scheme(&url) {
                Ok(Scheme::Ftp) => Arc::clone(&self.ftp_slots),
                _ => Arc::clone(&self.http_slots),
            };
            let timeout = self.timeout;
            let sender = sender.clone();

            tokio::spawn(async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    return;
                };
                // Run in its own task so a panic still reports an outcome.
                let task_url = url.clone();
                let worker = tokio::spawn(async move {
                    process(transport.as_ref(), &task_url, &jel, timeout).await
                });
                let result = worker
                    .await
                    .unwrap_or_else(|e| Err(IngestError::Worker(e.to_string())));
                let _ = sender.send(DocumentOutcome { url, result }).await;
            });
        }

        // Receiver closes once every task has reported.
        drop(sender);

        // Dropping an uncommitted transaction rolls the whole batch back.
        let tx = conn.unchecked_transaction()?;
        let mut ok = 0usize;
        while let Some(outcome) = receiver.recv().await {
            if save_outcome(&tx, &outcome)? {
                ok += 1;
            }
            pb.inc(1);
        }
        tx.commit()?;
        pb.finish_and_clear();

        Ok(BatchTally {
            ok,
            total: batch.len(),
        })
    }
}

/// Fetch one listing and turn each of its templates into a paper entry.
///
/// Any failure rejects the whole document.
async fn process<T: Transport + ?Sized>(
    transport: &T,
    url: &str,
    jel: &JelTable,
    timeout: Duration,
) -> IngestResult<Vec<PaperEntry>> {
    let doc = tokio::time::timeout(timeout, transport::load(transport, url))
        .await
        .map_err(|_| {
            IngestError::Transport(format!("timed out after {}s", timeout.as_secs_f64()))
        })??;
    let templates = read_document(&doc)?;
    templates
        .iter()
        .map(|t| build_entry(t, url, jel))
        .collect()
}

/// Record one outcome. Returns whether the document succeeded; storage
/// failures propagate and abort the batch.
fn save_outcome(conn: &Connection, outcome: &DocumentOutcome) -> IngestResult<bool> {
    match &outcome.result {
        Ok(papers) => {
            db::mark_ok(conn, &outcome.url)?;
            for paper in papers {
                db::replace_paper(conn, paper)?;
            }
            Ok(true)
        }
        Err(e) => {
            warn!("Failed {}: {}", outcome.url, e);
            db::mark_error(conn, &outcome.url, &e.to_string())?;
            Ok(false)
        }
    }
}

/// Rebuild papers from their stored templates without touching the network.
/// Useful after the JEL table or the cleaning rules change.
pub fn reprocess(conn: &Connection, limit: Option<usize>) -> IngestResult<BatchTally> {
    let jel = db::fetch_jel_codes(conn)?;
    let stored = db::fetch_stored_papers(conn, limit)?;
    let tx = conn.unchecked_transaction()?;
    let mut ok = 0usize;
    for paper in &stored {
        let entry = decompress(&paper.redif).and_then(|t| build_entry(&t, &paper.url, &jel));
        match entry {
            Ok(entry) => {
                db::replace_paper(&tx, &entry)?;
                ok += 1;
            }
            Err(e) => warn!("Skipping stored paper from {}: {}", paper.url, e),
        }
    }
    tx.commit()?;
    info!("Reprocessed {} of {} stored papers", ok, stored.len());
    Ok(BatchTally {
        ok,
        total: stored.len(),
    })
}
