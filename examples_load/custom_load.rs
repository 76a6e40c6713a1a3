use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{error, Level};

use tracing_es_sink::config::WriterConfig;
use tracing_es_sink::events::WriterEvent;
use tracing_es_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_es_sink::noop_client::NoopClient;
use tracing_es_sink::writer::BulkWriter;

#[tokio::main]
async fn main() {
    let config = WriterConfig {
        interval: Duration::from_millis(200),
        buffer_limit: Some(50_000),
        ..Default::default()
    };
    let (writer, mut events) = BulkWriter::new(config, Arc::new(NoopClient)).expect("create writer");

    let layer_config = LayerConfig {
        min_level: Level::ERROR,
        enable_stdout: false,
        transformer: None,
    };
    init_tracing_with_config(writer.clone(), layer_config).expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: appended {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sleep(Duration::from_secs(2)).await;
    writer.stop();

    let mut discarded = 0u64;
    while let Ok(event) = events.try_recv() {
        if let WriterEvent::LogDiscarded(_) = event {
            discarded += 1;
        }
    }
    println!("still buffered: {}, discarded: {}", writer.buffered(), discarded);
}
