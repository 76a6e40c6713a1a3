use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Event captured by [`crate::layer::ElasticsearchLayer`] before it is
/// turned into a document.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
}

/// A document waiting in the writer buffer for its next bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub index_name: String,
    pub doc_type: Option<String>,
    pub document: serde_json::Value,
    /// Number of failed send attempts so far.
    pub attempts: u32,
}

impl PendingRecord {
    pub fn new(
        index_name: impl Into<String>,
        doc_type: Option<String>,
        document: serde_json::Value,
    ) -> Self {
        PendingRecord {
            index_name: index_name.into(),
            doc_type,
            document,
            attempts: 0,
        }
    }
}
