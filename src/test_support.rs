//! Scripted [`IngestClient`] double shared by the unit tests.

use crate::client::{BulkItem, BulkItemResult, BulkOptions, BulkRequest, BulkResponse, HealthRequest, IngestClient};
use crate::error::IngestError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct ScriptedClient {
    health: Mutex<VecDeque<Result<(), IngestError>>>,
    bulk: Mutex<VecDeque<Result<BulkResponse, IngestError>>>,
    exists: Mutex<VecDeque<Result<bool, IngestError>>>,
    pub(crate) template_present: AtomicBool,
    pub(crate) requests: Mutex<Vec<BulkRequest>>,
    pub(crate) templates: Mutex<Vec<(String, Value)>>,
    pub(crate) health_calls: AtomicUsize,
    bulk_delay: Mutex<Option<Duration>>,
    bulk_in_flight: AtomicUsize,
    max_bulk_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_health(&self, result: Result<(), IngestError>) {
        self.health.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_bulk(&self, result: Result<BulkResponse, IngestError>) {
        self.bulk.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_exists(&self, result: Result<bool, IngestError>) {
        self.exists.lock().unwrap().push_back(result);
    }

    /// Make every `bulk` call take `delay` before answering.
    pub(crate) fn set_bulk_delay(&self, delay: Duration) {
        *self.bulk_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of `bulk` calls that were running at the same time.
    pub(crate) fn max_bulk_in_flight(&self) -> usize {
        self.max_bulk_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<BulkRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn template_puts(&self) -> usize {
        self.templates.lock().unwrap().len()
    }
}

/// Response where only the items at `failed` report an error.
pub(crate) fn response_with_failures(total: usize, failed: &[usize]) -> BulkResponse {
    let items = (0..total)
        .map(|i| {
            let error = failed
                .contains(&i)
                .then(|| json!({ "type": "mapper_parsing_exception", "reason": format!("item {i}") }));
            BulkItem {
                index: Some(BulkItemResult {
                    status: Some(if error.is_some() { 400 } else { 201 }),
                    error,
                }),
            }
        })
        .collect();
    BulkResponse {
        errors: !failed.is_empty(),
        items,
    }
}

#[async_trait]
impl IngestClient for ScriptedClient {
    async fn bulk(&self, request: &BulkRequest, _options: &BulkOptions) -> Result<BulkResponse, IngestError> {
        self.requests.lock().unwrap().push(request.clone());
        let running = self.bulk_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_bulk_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.bulk_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.bulk_in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.bulk.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(response_with_failures(request.len(), &[])))
    }

    async fn cluster_health(&self, _request: &HealthRequest) -> Result<(), IngestError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.health.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn template_exists(&self, _name: &str) -> Result<bool, IngestError> {
        let scripted = self.exists.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.template_present.load(Ordering::SeqCst)))
    }

    async fn put_template(&self, name: &str, document: &Value) -> Result<(), IngestError> {
        self.templates
            .lock()
            .unwrap()
            .push((name.to_string(), document.clone()));
        self.template_present.store(true, Ordering::SeqCst);
        Ok(())
    }
}
