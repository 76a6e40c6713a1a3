use crate::error::{ConnectionError, SendError};
use crate::record::PendingRecord;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Notifications raised by the writer. Failures never surface from
/// `append`; they are reported here instead.
#[derive(Debug, Clone)]
pub enum WriterEvent {
    /// The buffer was full and this record was evicted to make room.
    LogDiscarded(PendingRecord),
    /// The record failed `retry_limit` times and was dropped.
    LogError {
        record: PendingRecord,
        cause: Arc<SendError>,
    },
    /// A bulk send failed; the failed records were requeued.
    Warn(Arc<SendError>),
    /// The endpoint could not be made ready; the writer gave up.
    Error(Arc<ConnectionError>),
}

/// Receiving half of the event channel returned by
/// [`crate::writer::BulkWriter::new`].
pub type WriterEvents = mpsc::UnboundedReceiver<WriterEvent>;

/// Sending half held by the writer. Events are also logged so that they
/// are visible without a subscriber to the channel.
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<WriterEvent>,
}

impl EventEmitter {
    pub(crate) fn channel() -> (Self, WriterEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: WriterEvent) {
        match &event {
            WriterEvent::LogDiscarded(record) => {
                warn!(index = %record.index_name, "buffer full, discarding oldest record");
            }
            WriterEvent::LogError { record, cause } => {
                error!(
                    index = %record.index_name,
                    attempts = record.attempts,
                    error = %cause,
                    "retry limit reached, dropping record"
                );
            }
            WriterEvent::Warn(cause) => warn!(error = %cause, "bulk send failed"),
            WriterEvent::Error(cause) => error!(error = %cause, "elasticsearch endpoint unavailable"),
        }
        // Nobody listening is fine.
        let _ = self.tx.send(event);
    }
}
