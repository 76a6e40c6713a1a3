use crate::client::{BulkItem, BulkItemResult, BulkOptions, BulkRequest, BulkResponse, HealthRequest, IngestClient};
use crate::error::IngestError;
use async_trait::async_trait;
use serde_json::Value;

/// A client that accepts every request without any I/O.
///
/// Useful for measuring the overhead of the writer and layer themselves,
/// and for code that does not care about delivery.
#[derive(Clone, Default)]
pub struct NoopClient;

#[async_trait]
impl IngestClient for NoopClient {
    async fn bulk(&self, request: &BulkRequest, _options: &BulkOptions) -> Result<BulkResponse, IngestError> {
        let items = request
            .operations
            .iter()
            .map(|_| BulkItem {
                index: Some(BulkItemResult {
                    status: Some(201),
                    error: None,
                }),
            })
            .collect();
        Ok(BulkResponse { errors: false, items })
    }

    async fn cluster_health(&self, _request: &HealthRequest) -> Result<(), IngestError> {
        Ok(())
    }

    async fn template_exists(&self, _name: &str) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn put_template(&self, _name: &str, _document: &Value) -> Result<(), IngestError> {
        Ok(())
    }
}
