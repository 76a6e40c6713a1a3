use crate::client::IngestClient;
use crate::config::WriterConfig;
use crate::error::TemplateError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

const TEMPLATE_ES7: &str = include_str!("../templates/index-template-es7.json");
const TEMPLATE_ES6: &str = include_str!("../templates/index-template-es6.json");

/// Name of the template registered for `prefix`.
pub fn template_name(prefix: &str) -> String {
    format!("template_{prefix}")
}

/// Template document to register: the configured override if any,
/// otherwise the built-in one for the endpoint's major version. Its index
/// pattern is set to `<prefix>-*`.
pub fn select_template(config: &WriterConfig, prefix: &str) -> Result<Value, TemplateError> {
    let mut document = match &config.mapping_template {
        Some(explicit) => explicit.clone(),
        None => {
            let raw = if config.elasticsearch_version >= 7 {
                TEMPLATE_ES7
            } else {
                TEMPLATE_ES6
            };
            serde_json::from_str(raw).map_err(|e| TemplateError::InvalidDocument(e.to_string()))?
        }
    };

    let object = document
        .as_object_mut()
        .ok_or_else(|| TemplateError::InvalidDocument("template must be a JSON object".into()))?;
    object.insert("index_patterns".into(), Value::String(format!("{prefix}-*")));
    Ok(document)
}

/// Makes sure the index template exists before the writer starts flushing.
pub struct TemplateManager {
    client: Arc<dyn IngestClient>,
    config: Arc<WriterConfig>,
}

impl TemplateManager {
    pub fn new(client: Arc<dyn IngestClient>, config: Arc<WriterConfig>) -> Self {
        Self { client, config }
    }

    /// Create the template if it does not exist yet. An existing template
    /// is left untouched.
    ///
    /// **Returns**
    /// - `Ok(true)` if the template was created.
    /// - `Ok(false)` if it already existed.
    pub async fn ensure(&self) -> Result<bool, TemplateError> {
        let prefix = self.config.index_prefix.resolve();
        let name = template_name(&prefix);

        let exists = self
            .client
            .template_exists(&name)
            .await
            .map_err(|source| TemplateError::Check {
                name: name.clone(),
                source,
            })?;
        if exists {
            debug!(template = %name, "index template already present");
            return Ok(false);
        }

        let document = select_template(&self.config, &prefix)?;
        self.client
            .put_template(&name, &document)
            .await
            .map_err(|source| TemplateError::Create {
                name: name.clone(),
                source,
            })?;
        info!(template = %name, "index template created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::test_support::ScriptedClient;
    use serde_json::json;

    fn manager(client: &Arc<ScriptedClient>, config: WriterConfig) -> TemplateManager {
        TemplateManager::new(client.clone(), Arc::new(config))
    }

    #[tokio::test]
    async fn creates_missing_template_then_is_idempotent() {
        let client = Arc::new(ScriptedClient::new());
        let config = WriterConfig {
            index_prefix: "app".into(),
            ..Default::default()
        };
        let manager = manager(&client, config);

        assert!(manager.ensure().await.unwrap());
        assert!(!manager.ensure().await.unwrap());
        assert!(!manager.ensure().await.unwrap());
        assert_eq!(client.template_puts(), 1);

        let (name, document) = client.templates.lock().unwrap()[0].clone();
        assert_eq!(name, "template_app");
        assert_eq!(document["index_patterns"], "app-*");
        assert!(document["mappings"]["properties"]["@timestamp"].is_object());
    }

    #[tokio::test]
    async fn existing_template_is_left_alone() {
        let client = Arc::new(ScriptedClient::new());
        client.template_present.store(true, std::sync::atomic::Ordering::SeqCst);
        let manager = manager(&client, WriterConfig::default());

        assert!(!manager.ensure().await.unwrap());
        assert!(!manager.ensure().await.unwrap());
        assert_eq!(client.template_puts(), 0);
    }

    #[test]
    fn legacy_endpoints_get_typed_mapping() {
        let config = WriterConfig {
            elasticsearch_version: 6,
            ..Default::default()
        };
        let document = select_template(&config, "logs").unwrap();
        assert!(document["mappings"]["_doc"]["properties"]["message"].is_object());
        assert_eq!(document["index_patterns"], "logs-*");
    }

    #[test]
    fn explicit_template_overrides_builtin() {
        let config = WriterConfig {
            mapping_template: Some(json!({ "index_patterns": "x", "settings": { "number_of_shards": 3 } })),
            ..Default::default()
        };
        let document = select_template(&config, "svc").unwrap();
        assert_eq!(document["settings"]["number_of_shards"], 3);
        assert_eq!(document["index_patterns"], "svc-*");
    }

    #[test]
    fn non_object_template_is_rejected() {
        let config = WriterConfig {
            mapping_template: Some(json!(["not", "an", "object"])),
            ..Default::default()
        };
        assert!(matches!(
            select_template(&config, "svc"),
            Err(TemplateError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn check_failure_is_reported() {
        let client = Arc::new(ScriptedClient::new());
        client.push_exists(Err(IngestError::transport("connection refused")));
        let manager = manager(&client, WriterConfig::default());

        assert!(matches!(manager.ensure().await, Err(TemplateError::Check { .. })));
        assert_eq!(client.template_puts(), 0);
    }
}
