use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use tracing_es_sink::config::WriterConfig;
use tracing_es_sink::init::init_tracing;
use tracing_es_sink::noop_client::NoopClient;
use tracing_es_sink::writer::BulkWriter;

#[tokio::main]
async fn main() {
    let (writer, _events) =
        BulkWriter::new(WriterConfig::default(), Arc::new(NoopClient)).expect("create writer");
    init_tracing(writer.clone()).expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: appended {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Give the flush loop time to drain the buffer
    sleep(Duration::from_secs(3)).await;
    println!("still buffered: {}", writer.buffered());
}
