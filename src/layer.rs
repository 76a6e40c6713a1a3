use crate::record::LogRecord;
use crate::transform::{default_transformer, Transformer};
use crate::writer::BulkWriter;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never shipped. The writer and its HTTP stack
/// log through `tracing` themselves; forwarding those events would feed
/// the writer its own diagnostics.
const IGNORED_TARGET_PREFIXES: &[&str] = &[env!("CARGO_CRATE_NAME"), "reqwest", "hyper", "h2"];

/// `tracing_subscriber` layer that turns events into documents and hands
/// them to a [`BulkWriter`].
///
/// `on_event` only captures fields and calls [`BulkWriter::append`], which
/// never blocks; batching and network I/O happen on background tasks.
pub struct ElasticsearchLayer {
    writer: BulkWriter,
    min_level: Level,
    transformer: Transformer,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the writer.
    pub enqueued_events: Arc<AtomicU64>,
}

impl ElasticsearchLayer {
    /// Create a layer forwarding events at `min_level` and more severe.
    pub fn new(writer: BulkWriter, min_level: Level) -> Self {
        Self {
            writer,
            min_level,
            transformer: Arc::new(default_transformer),
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the default document shape.
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn writer(&self) -> &BulkWriter {
        &self.writer
    }

    fn is_ignored(target: &str) -> bool {
        IGNORED_TARGET_PREFIXES
            .iter()
            .any(|prefix| target == *prefix || target.starts_with(&format!("{prefix}::")))
    }
}

impl<S> Layer<S> for ElasticsearchLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level || Self::is_ignored(meta.target()) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            module_path: meta.module_path().map(|s| s.to_string()),
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            fields,
            message,
        };

        let config = self.writer.config();
        let index = config.index_name(record.timestamp);
        let document = (self.transformer)(&record);
        self.writer.append(index, config.effective_doc_type(), document);
        self.enqueued_events.fetch_add(1, Ordering::Relaxed);
    }
}

use tracing::field::{Field, Visit};

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
