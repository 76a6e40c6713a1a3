use crate::backoff::{BackoffError, BackoffOperation};
use crate::client::{HealthRequest, IngestClient};
use crate::config::WriterConfig;
use crate::error::{CheckError, ConnectionError};
use crate::template::TemplateManager;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Verifies the endpoint is reachable and healthy, and that the index
/// template exists when configured, before the writer may flush.
pub struct ConnectionMonitor {
    client: Arc<dyn IngestClient>,
    config: Arc<WriterConfig>,
    templates: TemplateManager,
    backoff: BackoffOperation,
}

impl ConnectionMonitor {
    pub fn new(client: Arc<dyn IngestClient>, config: Arc<WriterConfig>) -> Self {
        let templates = TemplateManager::new(client.clone(), config.clone());
        let backoff = BackoffOperation::new("connection_check", config.connection_backoff());
        Self {
            client,
            config,
            templates,
            backoff,
        }
    }

    fn health_request(&self) -> HealthRequest {
        let health = &self.config.health_check;
        HealthRequest {
            timeout: health.timeout,
            wait_for_nodes: health.wait_for_nodes.clone(),
            wait_for_status: health.wait_for_status,
        }
    }

    /// One health check, followed by the template step if enabled.
    pub async fn check_once(&self) -> Result<(), CheckError> {
        self.client.cluster_health(&self.health_request()).await?;
        debug!(status = %self.config.health_check.wait_for_status, "cluster health ok");

        if self.config.ensure_mapping_template {
            self.templates.ensure().await?;
        }
        Ok(())
    }

    /// Retry [`ConnectionMonitor::check_once`] until it succeeds, the
    /// retry policy gives up, or `cancelled` resolves.
    pub async fn check<C>(&self, cancelled: C) -> Result<(), ConnectionError>
    where
        C: Future<Output = ()>,
    {
        match self.backoff.run(|| self.check_once(), cancelled).await {
            Ok(()) => {
                info!("elasticsearch endpoint ready");
                Ok(())
            }
            Err(BackoffError::Exhausted { attempts, last }) => {
                Err(ConnectionError::Exhausted { attempts, last })
            }
            Err(BackoffError::Cancelled) => Err(ConnectionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::config::HealthCheckConfig;
    use crate::error::IngestError;
    use crate::test_support::ScriptedClient;
    use std::future::pending;
    use std::time::Duration;

    fn config(verification_mode: bool, retry_limit: u32) -> WriterConfig {
        WriterConfig {
            verification_mode,
            retry_limit,
            health_check: HealthCheckConfig {
                backoff: BackoffPolicy {
                    initial_delay: Duration::from_millis(100),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn monitor(client: &Arc<ScriptedClient>, config: WriterConfig) -> ConnectionMonitor {
        ConnectionMonitor::new(client.clone(), Arc::new(config))
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_cluster_creates_template_once() {
        let client = Arc::new(ScriptedClient::new());
        let monitor = monitor(&client, config(false, 5));

        monitor.check(pending()).await.unwrap();
        monitor.check(pending()).await.unwrap();

        assert_eq!(client.health_calls(), 2);
        assert_eq!(client.template_puts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn template_step_skipped_when_disabled() {
        let client = Arc::new(ScriptedClient::new());
        let monitor = monitor(
            &client,
            WriterConfig {
                ensure_mapping_template: false,
                ..config(false, 5)
            },
        );

        monitor.check(pending()).await.unwrap();
        assert_eq!(client.template_puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_is_retried_until_cluster_recovers() {
        let client = Arc::new(ScriptedClient::new());
        for _ in 0..10 {
            client.push_health(Err(IngestError::transport("connection refused")));
        }
        let monitor = monitor(&client, config(false, 2));

        monitor.check(pending()).await.unwrap();
        assert_eq!(client.health_calls(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_mode_gives_up() {
        let client = Arc::new(ScriptedClient::new());
        for _ in 0..10 {
            client.push_health(Err(IngestError::Unhealthy("red".into())));
        }
        let monitor = monitor(&client, config(true, 2));

        let err = monitor.check(pending()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Exhausted {
                attempts: 3,
                last: CheckError::Health(_)
            }
        ));
        assert_eq!(client.health_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn template_failure_is_retried_with_health_check() {
        let client = Arc::new(ScriptedClient::new());
        client.push_exists(Err(IngestError::Status {
            status: 503,
            body: "unavailable".into(),
        }));
        let monitor = monitor(&client, config(true, 3));

        monitor.check(pending()).await.unwrap();
        assert_eq!(client.health_calls(), 2);
        assert_eq!(client.template_puts(), 1);
    }
}
