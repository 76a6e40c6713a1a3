use crate::buffer::BufferStore;
use crate::client::IngestClient;
use crate::config::WriterConfig;
use crate::connection::ConnectionMonitor;
use crate::error::{ConnectionError, WriterError};
use crate::events::{EventEmitter, WriterEvent, WriterEvents};
use crate::flusher;
use crate::record::PendingRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Lifecycle of a [`BulkWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Stopped,
    CheckingConnection,
    /// Ready, no flush loop scheduled. The next `append` resumes it.
    ReadyIdle,
    /// Ready with a flush loop draining the buffer every interval.
    ReadyRunning,
    /// Connection or template setup gave up. Terminal.
    Failed,
}

impl WriterState {
    pub fn is_ready(self) -> bool {
        matches!(self, WriterState::ReadyIdle | WriterState::ReadyRunning)
    }
}

/// State shared between the writer handle and its background tasks.
pub(crate) struct Shared {
    pub(crate) config: Arc<WriterConfig>,
    pub(crate) client: Arc<dyn IngestClient>,
    pub(crate) events: EventEmitter,
    buffer: Mutex<BufferStore>,
    state: watch::Sender<WriterState>,
    runtime: Handle,
    check_epoch: watch::Sender<u64>,
    flush_epoch: AtomicU64,
    send_slot: tokio::sync::Mutex<()>,
}

impl Shared {
    pub(crate) fn state(&self) -> WriterState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<WriterState> {
        self.state.subscribe()
    }

    /// Move to `to` if the current state is `from`. Returns whether the
    /// transition happened.
    pub(crate) fn transition(&self, from: WriterState, to: WriterState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn buffer(&self) -> MutexGuard<'_, BufferStore> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take everything buffered for one flush. When there is nothing to
    /// send the writer goes idle under the same lock, so a concurrent
    /// `append` either lands in this snapshot or observes `ReadyIdle`.
    pub(crate) fn take_snapshot_or_idle(&self) -> Option<Vec<PendingRecord>> {
        let mut buffer = self.buffer();
        let batch = buffer.drain_all();
        if batch.is_empty() {
            self.transition(WriterState::ReadyRunning, WriterState::ReadyIdle);
            None
        } else {
            Some(batch)
        }
    }

    pub(crate) fn is_current_flush(&self, epoch: u64) -> bool {
        self.flush_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Wait until no other flush has a bulk request in flight. The guard
    /// is held until the response has been handled.
    pub(crate) async fn acquire_send_slot(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.send_slot.lock().await
    }

    fn next_check_epoch(&self) -> u64 {
        let mut next = 0;
        self.check_epoch.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }

    pub(crate) fn spawn_connection_check(self: &Arc<Self>) {
        let epoch = self.next_check_epoch();
        let shared = Arc::clone(self);

        self.runtime.spawn(async move {
            let monitor = ConnectionMonitor::new(shared.client.clone(), shared.config.clone());
            let mut state_rx = shared.subscribe();
            let mut epoch_rx = shared.check_epoch.subscribe();
            // A stop/start pair can flip the state back to CheckingConnection
            // before this task observes Stopped; the epoch catches that.
            let cancelled = async move {
                tokio::select! {
                    _ = state_rx.wait_for(|s| *s != WriterState::CheckingConnection) => {}
                    _ = epoch_rx.wait_for(|e| *e != epoch) => {}
                }
            };

            let outcome = monitor.check(cancelled).await;
            if *shared.check_epoch.borrow() != epoch {
                debug!("stale connection check finished, ignoring");
                return;
            }

            match outcome {
                Ok(()) => shared.mark_ready(),
                Err(ConnectionError::Cancelled) => debug!("connection check cancelled"),
                Err(err) => {
                    if shared.transition(WriterState::CheckingConnection, WriterState::Failed) {
                        shared.events.emit(WriterEvent::Error(Arc::new(err)));
                    }
                }
            }
        });
    }

    fn mark_ready(self: &Arc<Self>) {
        if !self.transition(WriterState::CheckingConnection, WriterState::ReadyIdle) {
            return;
        }
        info!(buffered = self.buffer().len(), "bulk writer ready");
        if self.config.buffering {
            self.resume_flushing();
        }
    }

    /// Start a flush loop if the writer is idle.
    pub(crate) fn resume_flushing(self: &Arc<Self>) {
        if !self.transition(WriterState::ReadyIdle, WriterState::ReadyRunning) {
            return;
        }
        let epoch = self.flush_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.runtime.spawn(flusher::run(Arc::clone(self), epoch));
    }

    pub(crate) fn spawn_single_send(self: &Arc<Self>, record: PendingRecord) {
        self.runtime.spawn(flusher::send_single(Arc::clone(self), record));
    }
}

/// Buffers records and ships them to the endpoint in bulk requests.
///
/// Cloning the writer yields another handle on the same buffer and state.
/// `append` never blocks and never fails; delivery problems are reported
/// through the [`WriterEvents`] channel returned by [`BulkWriter::new`].
#[derive(Clone)]
pub struct BulkWriter {
    shared: Arc<Shared>,
}

impl BulkWriter {
    /// Create a stopped writer.
    ///
    /// Must be called from within a tokio runtime; background tasks are
    /// spawned on it.
    pub fn new(
        config: WriterConfig,
        client: Arc<dyn IngestClient>,
    ) -> Result<(Self, WriterEvents), WriterError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| WriterError::NoRuntime)?;
        let (events, rx) = EventEmitter::channel();
        let (state, _) = watch::channel(WriterState::Stopped);
        let (check_epoch, _) = watch::channel(0);

        let shared = Shared {
            buffer: Mutex::new(BufferStore::new(config.buffer_limit)),
            config: Arc::new(config),
            client,
            events,
            state,
            runtime,
            check_epoch,
            flush_epoch: AtomicU64::new(0),
            send_slot: tokio::sync::Mutex::new(()),
        };
        Ok((
            BulkWriter {
                shared: Arc::new(shared),
            },
            rx,
        ))
    }

    pub fn config(&self) -> &WriterConfig {
        &self.shared.config
    }

    pub fn state(&self) -> WriterState {
        self.shared.state()
    }

    /// Watch state transitions, e.g. to wait for readiness.
    pub fn subscribe_state(&self) -> watch::Receiver<WriterState> {
        self.shared.subscribe()
    }

    /// Number of records waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.shared.buffer().len()
    }

    /// Begin checking the connection. The writer starts flushing once the
    /// endpoint is healthy and the template is in place.
    pub fn start(&self) {
        if self
            .shared
            .transition(WriterState::Stopped, WriterState::CheckingConnection)
        {
            debug!("bulk writer starting, checking connection");
            self.shared.spawn_connection_check();
        } else {
            debug!(state = ?self.state(), "start ignored");
        }
    }

    /// Stop scheduling flushes. Buffered records are kept and a send
    /// already in flight still completes; its failed records are requeued.
    pub fn stop(&self) {
        let stopped = self.shared.state.send_if_modified(|state| match state {
            WriterState::Stopped | WriterState::Failed => false,
            _ => {
                *state = WriterState::Stopped;
                true
            }
        });
        if stopped {
            info!(buffered = self.buffered(), "bulk writer stopped");
        }
    }

    /// Queue one document for delivery.
    pub fn append(&self, index_name: impl Into<String>, doc_type: Option<String>, document: serde_json::Value) {
        let record = PendingRecord::new(index_name, doc_type, document);

        if !self.shared.config.buffering {
            if self.state().is_ready() {
                self.shared.spawn_single_send(record);
            } else {
                trace!(index = %record.index_name, "writer not ready, dropping unbuffered record");
            }
            return;
        }

        let evicted = self.shared.buffer().append(record);
        if let Some(old) = evicted {
            self.shared.events.emit(WriterEvent::LogDiscarded(old));
        }
        self.shared.resume_flushing();
    }
}
