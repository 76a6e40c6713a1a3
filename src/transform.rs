use crate::record::LogRecord;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Turns a captured [`LogRecord`] into the document that gets indexed.
pub type Transformer = Arc<dyn Fn(&LogRecord) -> Value + Send + Sync>;

/// Default document shape, matching the built-in index templates:
///
/// ```json
/// { "@timestamp": "...", "message": "...", "severity": "error",
///   "fields": { "target": "...", ... } }
/// ```
pub fn default_transformer(record: &LogRecord) -> Value {
    let mut fields: Map<String, Value> = record
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    fields.insert("target".into(), Value::String(record.target.clone()));
    if let Some(module_path) = &record.module_path {
        fields.insert("module_path".into(), Value::String(module_path.clone()));
    }
    if let Some(file) = &record.file {
        fields.insert("file".into(), Value::String(file.clone()));
    }
    if let Some(line) = record.line {
        fields.insert("line".into(), Value::from(line));
    }

    json!({
        "@timestamp": record.timestamp.to_rfc3339(),
        "message": record.message.clone().unwrap_or_default(),
        "severity": record.level.to_ascii_lowercase(),
        "fields": fields,
    })
}
