use crate::error::IngestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Remote bulk-ingest endpoint used by the writer.
///
/// Implementations own transport, TLS and serialization. The writer only
/// assembles the logical [`BulkRequest`] and interprets the outcome. All
/// methods are called from background tokio tasks, never from the thread
/// that appends records.
#[async_trait]
pub trait IngestClient: Send + Sync {
    /// Submit one bulk request.
    ///
    /// **Returns**
    /// - `Ok(response)` if the endpoint processed the request, even when
    ///   individual items failed (`response.errors == true`).
    /// - `Err(..)` if the request as a whole was rejected.
    async fn bulk(&self, request: &BulkRequest, options: &BulkOptions) -> Result<BulkResponse, IngestError>;

    /// Succeeds once the cluster satisfies `request` within its timeout.
    async fn cluster_health(&self, request: &HealthRequest) -> Result<(), IngestError>;

    async fn template_exists(&self, name: &str) -> Result<bool, IngestError>;

    async fn put_template(&self, name: &str, document: &Value) -> Result<(), IngestError>;
}

/// Action metadata line of an `index` bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexAction {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Failed attempts so far. Kept for clients and diagnostics; the
    /// `_bulk` API rejects unknown metadata so it is not serialized.
    #[serde(skip)]
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub action: IndexAction,
    pub document: Value,
}

/// Logical body of one `_bulk` call, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    pub operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Render the request as newline-delimited JSON, one action line and
    /// one document line per operation.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut body = String::new();
        for op in &self.operations {
            let action = serde_json::json!({ "index": &op.action });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&op.document)?);
            body.push('\n');
        }
        Ok(body)
    }
}

/// Per-call options passed alongside a [`BulkRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOptions {
    pub wait_for_active_shards: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// One entry of the `items` array. Only `index` operations are issued.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkItem {
    #[serde(default, alias = "create")]
    pub index: Option<BulkItemResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkItemResult {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    /// The item's error, if the endpoint reported one.
    pub fn error(&self) -> Option<&Value> {
        self.index.as_ref().and_then(|r| r.error.as_ref())
    }
}

/// Minimum cluster status accepted by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthRequest {
    pub timeout: Duration,
    /// Node count expression, e.g. `">=1"`.
    pub wait_for_nodes: String,
    pub wait_for_status: HealthStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ndjson_pairs_action_and_document() {
        let request = BulkRequest {
            operations: vec![BulkOperation {
                action: IndexAction {
                    index: "logs-2024.01.01".into(),
                    doc_type: Some("_doc".into()),
                    pipeline: Some("geoip".into()),
                    attempts: 2,
                },
                document: json!({ "message": "hello" }),
            }],
        };

        let body = request.to_ndjson().unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            action,
            json!({ "index": { "_index": "logs-2024.01.01", "_type": "_doc", "pipeline": "geoip" } })
        );
        assert_eq!(lines[1], r#"{"message":"hello"}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn response_items_expose_errors() {
        let response: BulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_index": "logs", "status": 201 } },
                { "index": { "_index": "logs", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } }
            ]
        }))
        .unwrap();

        assert!(response.errors);
        assert!(response.items[0].error().is_none());
        assert_eq!(response.items[1].error().unwrap()["reason"], "bad field");
        assert_eq!(response.items[1].index.as_ref().unwrap().status, Some(400));
    }
}
