use crate::layer::ElasticsearchLayer;
use crate::transform::Transformer;
use crate::writer::BulkWriter;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `min_level`: least severe level that is shipped to Elasticsearch.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`ElasticsearchLayer`] so events are also printed.
/// - `transformer`: optional replacement for
///   [`crate::transform::default_transformer`].
#[derive(Clone)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
    pub transformer: Option<Transformer>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            enable_stdout: true,
            transformer: None,
        }
    }
}

/// Start `writer` and install a global `tracing` subscriber that feeds it.
///
/// **Parameters**
/// - `writer`: the [`BulkWriter`] receiving documents. It is started here;
///   records logged before the endpoint is ready stay buffered.
/// - `config`: [`LayerConfig`] controlling level filtering and output.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(writer: BulkWriter, config: LayerConfig) -> Result<(), SetGlobalDefaultError> {
    writer.start();

    let mut layer = ElasticsearchLayer::new(writer, config.min_level);
    if let Some(transformer) = config.transformer {
        layer = layer.with_transformer(transformer);
    }

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(writer: BulkWriter) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(writer, LayerConfig::default())
}
