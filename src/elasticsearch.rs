use crate::client::{BulkOptions, BulkRequest, BulkResponse, HealthRequest, IngestClient};
use crate::error::IngestError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

/// Connection settings for [`ElasticsearchClient`].
#[derive(Clone, Debug)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. "http://localhost:9200".
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Takes priority over basic auth when set.
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// [`IngestClient`] talking to Elasticsearch (or OpenSearch) over HTTP.
#[derive(Clone)]
pub struct ElasticsearchClient {
    client: Client,
    config: ElasticsearchConfig,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timed_out: bool,
}

/// Elasticsearch duration syntax, e.g. `30s` or `1500ms`.
fn es_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

impl ElasticsearchClient {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| IngestError::transport_with_source("failed to create http client", e))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let req = self.client.request(method, url);

        if let Some(api_key) = &self.config.api_key {
            req.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.config.username {
            req.basic_auth(username, self.config.password.as_ref())
        } else {
            req
        }
    }

    async fn send(req: RequestBuilder, what: &str) -> Result<Response, IngestError> {
        req.send()
            .await
            .map_err(|e| IngestError::transport_with_source(format!("{what} request failed"), e))
    }

    async fn error_status(resp: Response) -> IngestError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        IngestError::Status { status, body }
    }
}

#[async_trait]
impl IngestClient for ElasticsearchClient {
    async fn bulk(&self, request: &BulkRequest, options: &BulkOptions) -> Result<BulkResponse, IngestError> {
        let body = request
            .to_ndjson()
            .map_err(|e| IngestError::Decode(format!("failed to encode bulk body: {e}")))?;
        trace!(bytes = body.len(), operations = request.len(), "posting bulk body");

        let req = self
            .request(Method::POST, "/_bulk")
            .query(&[
                ("wait_for_active_shards", options.wait_for_active_shards.as_str()),
                ("timeout", es_duration(options.timeout).as_str()),
            ])
            .timeout(options.timeout)
            .header("Content-Type", "application/x-ndjson")
            .body(body);

        let resp = Self::send(req, "bulk").await?;
        if !resp.status().is_success() {
            return Err(Self::error_status(resp).await);
        }
        resp.json::<BulkResponse>()
            .await
            .map_err(|e| IngestError::Decode(e.to_string()))
    }

    async fn cluster_health(&self, request: &HealthRequest) -> Result<(), IngestError> {
        let req = self
            .request(Method::GET, "/_cluster/health")
            .query(&[
                ("wait_for_status", request.wait_for_status.as_str()),
                ("wait_for_nodes", request.wait_for_nodes.as_str()),
                ("timeout", es_duration(request.timeout).as_str()),
            ])
            // Let the server-side wait finish before timing out locally.
            .timeout(request.timeout + Duration::from_secs(5));

        let resp = Self::send(req, "cluster health").await?;
        // 408 means the wait timed out; the body still describes the cluster.
        if !resp.status().is_success() && resp.status() != StatusCode::REQUEST_TIMEOUT {
            return Err(Self::error_status(resp).await);
        }

        let health: HealthResponse = resp
            .json()
            .await
            .map_err(|e| IngestError::Decode(e.to_string()))?;
        if health.timed_out {
            return Err(IngestError::Unhealthy(format!(
                "status {} did not reach {}",
                health.status.as_deref().unwrap_or("unknown"),
                request.wait_for_status
            )));
        }
        Ok(())
    }

    async fn template_exists(&self, name: &str) -> Result<bool, IngestError> {
        let req = self.request(Method::HEAD, &format!("/_template/{name}"));
        let resp = Self::send(req, "template exists").await?;
        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Self::error_status(resp).await)
        }
    }

    async fn put_template(&self, name: &str, document: &Value) -> Result<(), IngestError> {
        let req = self
            .request(Method::PUT, &format!("/_template/{name}"))
            .json(document);
        let resp = Self::send(req, "put template").await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_status(resp).await)
        }
    }
}
