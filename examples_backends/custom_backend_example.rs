use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};
use tracing_es_sink::{
    client::{BulkItem, BulkItemResult, BulkOptions, BulkRequest, BulkResponse, HealthRequest, IngestClient},
    config::WriterConfig,
    error::IngestError,
    init::init_tracing,
    writer::BulkWriter,
};

/// Example of plugging in a completely custom endpoint by implementing
/// the `IngestClient` trait directly. Imagine this forwards bulk bodies to
/// some proprietary ingest gateway.
struct PrintingClient;

#[async_trait]
impl IngestClient for PrintingClient {
    async fn bulk(&self, request: &BulkRequest, _options: &BulkOptions) -> Result<BulkResponse, IngestError> {
        // Here you would call your own client library.
        for op in &request.operations {
            println!("[gateway] {} <- {}", op.action.index, op.document);
        }
        let items = request
            .operations
            .iter()
            .map(|_| BulkItem {
                index: Some(BulkItemResult { status: Some(201), error: None }),
            })
            .collect();
        Ok(BulkResponse { errors: false, items })
    }

    async fn cluster_health(&self, _request: &HealthRequest) -> Result<(), IngestError> {
        Ok(())
    }

    async fn template_exists(&self, _name: &str) -> Result<bool, IngestError> {
        Ok(false)
    }

    async fn put_template(&self, name: &str, document: &Value) -> Result<(), IngestError> {
        println!("[gateway] template {name}: {document}");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let client: Arc<dyn IngestClient> = Arc::new(PrintingClient);
    let config = WriterConfig {
        interval: std::time::Duration::from_millis(200),
        ..Default::default()
    };
    let (writer, _events) = BulkWriter::new(config, client).expect("create writer");

    init_tracing(writer).expect("set global subscriber");

    info!("custom backend example started");
    error!(db = "gateway", "simulated error sent via custom backend");

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
}
