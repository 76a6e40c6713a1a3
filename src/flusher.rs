//! Periodic drain of the writer buffer into bulk requests.
//!
//! A flush loop runs while the writer is `ReadyRunning`. Every tick takes
//! the whole buffer, sends it as one bulk request and waits `interval`
//! after the request settles. An empty buffer ends the loop; the next
//! `append` starts a new one.
//!
//! Flushes hold the writer's send slot from snapshot to response, so a
//! loop started by a quick `stop`/`start` waits for the previous loop's
//! request before taking its own snapshot.
//!
//! Failed items are put back with their attempt count raised, and the
//! writer returns to checking the connection before flushing again. Only
//! the items the endpoint reported as failed are retried; items it
//! accepted are not sent twice.

use crate::client::{BulkOperation, BulkOptions, BulkRequest, BulkResponse, IndexAction};
use crate::config::WriterConfig;
use crate::error::{IngestError, SendError};
use crate::events::WriterEvent;
use crate::record::PendingRecord;
use crate::writer::{Shared, WriterState};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, trace};

/// Result of one [`flush`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FlushOutcome {
    /// Nothing was buffered; the writer went idle.
    Empty,
    Delivered(usize),
    /// Some records failed. A connection check was scheduled if this loop
    /// still owns the session.
    Failed,
    /// The writer was stopped or restarted while waiting for the send slot.
    Superseded,
}

pub(crate) fn build_request(batch: &[PendingRecord], config: &WriterConfig) -> BulkRequest {
    let operations = batch
        .iter()
        .map(|record| BulkOperation {
            action: IndexAction {
                index: record.index_name.clone(),
                doc_type: record.doc_type.clone(),
                pipeline: config.pipeline.clone(),
                attempts: record.attempts,
            },
            document: record.document.clone(),
        })
        .collect();
    BulkRequest { operations }
}

fn bulk_options(config: &WriterConfig) -> BulkOptions {
    BulkOptions {
        wait_for_active_shards: config.wait_for_active_shards.clone(),
        timeout: config.request_timeout,
    }
}

/// Positions of the batch that must be retried, with the cause.
///
/// When the response cannot be matched to the batch item by item, every
/// record is considered failed.
pub(crate) fn failed_items(
    result: Result<BulkResponse, IngestError>,
    total: usize,
) -> Option<(Vec<usize>, SendError)> {
    let response = match result {
        Ok(response) => response,
        Err(err) => return Some(((0..total).collect(), SendError::Rejected(err))),
    };
    if !response.errors {
        return None;
    }

    let failed: Vec<usize> = response
        .items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.error().is_some())
        .map(|(i, _)| i)
        .collect();

    let first_reason = response
        .items
        .iter()
        .find_map(|item| item.error())
        .map(|error| match error.get("reason").and_then(|r| r.as_str()) {
            Some(reason) => reason.to_string(),
            None => error.to_string(),
        })
        .unwrap_or_else(|| "unknown item error".to_string());

    let failed = if response.items.len() != total || failed.is_empty() {
        (0..total).collect()
    } else {
        failed
    };
    let cause = SendError::ItemsFailed {
        failed: failed.len(),
        total,
        first_reason,
    };
    Some((failed, cause))
}

/// Requeue the failed records that still have retries left and report
/// the others.
fn handle_failure(
    shared: &Arc<Shared>,
    epoch: u64,
    batch: Vec<PendingRecord>,
    failed: Vec<usize>,
    cause: SendError,
) {
    let cause = Arc::new(cause);
    let retry_limit = shared.config.retry_limit;
    let mut retry = Vec::with_capacity(failed.len());

    for (i, mut record) in batch.into_iter().enumerate() {
        if failed.binary_search(&i).is_err() {
            continue;
        }
        record.attempts += 1;
        if record.attempts < retry_limit {
            retry.push(record);
        } else {
            shared.events.emit(WriterEvent::LogError {
                record,
                cause: Arc::clone(&cause),
            });
        }
    }

    let requeued = retry.len();
    let overflow = shared.buffer().requeue(retry);
    debug!(requeued, overflow, "failed records requeued");

    shared.events.emit(WriterEvent::Warn(cause));

    if !shared.is_current_flush(epoch) {
        debug!("writer restarted during send, leaving connection check to the new session");
        return;
    }
    if shared.transition(WriterState::ReadyRunning, WriterState::CheckingConnection) {
        shared.spawn_connection_check();
    }
}

/// Send everything currently buffered as one bulk request.
pub(crate) async fn flush(shared: &Arc<Shared>, epoch: u64) -> FlushOutcome {
    let _slot = shared.acquire_send_slot().await;
    if shared.state() != WriterState::ReadyRunning || !shared.is_current_flush(epoch) {
        return FlushOutcome::Superseded;
    }

    let batch = match shared.take_snapshot_or_idle() {
        Some(batch) => batch,
        None => {
            trace!("buffer empty, flush loop going idle");
            return FlushOutcome::Empty;
        }
    };

    let request = build_request(&batch, &shared.config);
    let options = bulk_options(&shared.config);
    let total = batch.len();
    debug!(records = total, "sending bulk request");

    let result = shared.client.bulk(&request, &options).await;
    match failed_items(result, total) {
        None => {
            debug!(records = total, "bulk request delivered");
            FlushOutcome::Delivered(total)
        }
        Some((failed, cause)) => {
            handle_failure(shared, epoch, batch, failed, cause);
            FlushOutcome::Failed
        }
    }
}

/// Flush loop for one `ReadyRunning` session.
pub(crate) async fn run(shared: Arc<Shared>, epoch: u64) {
    let mut state_rx = shared.subscribe();

    loop {
        if shared.state() != WriterState::ReadyRunning || !shared.is_current_flush(epoch) {
            break;
        }
        match flush(&shared, epoch).await {
            FlushOutcome::Delivered(sent) => trace!(sent, "waiting for next tick"),
            FlushOutcome::Empty | FlushOutcome::Failed | FlushOutcome::Superseded => break,
        }

        state_rx.borrow_and_update();
        tokio::select! {
            _ = sleep(shared.config.interval) => {}
            _ = state_rx.changed() => {}
        }
    }
}

/// Unbuffered mode: one best-effort request per record, no retry.
pub(crate) async fn send_single(shared: Arc<Shared>, record: PendingRecord) {
    let batch = [record];
    let request = build_request(&batch, &shared.config);
    let result = shared.client.bulk(&request, &bulk_options(&shared.config)).await;
    if let Some((_, cause)) = failed_items(result, 1) {
        shared.events.emit(WriterEvent::Warn(Arc::new(cause)));
    }
}
