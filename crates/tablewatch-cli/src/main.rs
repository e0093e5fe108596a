//! Demo collaborator for the watch engine.
//!
//! Seeds an in-memory table, watches the fixed demo query, and mutates the
//! table in the background so refreshes can be observed on the console.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablewatch_core::{ConsoleSink, MemorySource, QueryDescriptor, Row, TableWatcher};

/// The fixed watched statement. The facility keys registrations on the
/// literal text, so it is reproduced byte for byte.
const WATCH_QUERY: &str = "SELECT [ID],[Name],[Age] from dbo.Test_Table where [Age] = 1";

#[derive(Parser, Debug)]
#[command(name = "tablewatch")]
#[command(version, about = "Watch a table's result set for changes", long_about = None)]
struct Args {
    /// Connection endpoint for the watched database.
    #[arg(long, default_value = "Server=localhost;Database=test")]
    endpoint: String,

    /// Seconds between simulated external writes. 0 disables the writer.
    #[arg(long, default_value_t = 2)]
    write_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!(endpoint = %args.endpoint, "starting watch");

    let descriptor = QueryDescriptor::new(WATCH_QUERY, "dbo.Test_Table", ["ID", "Name", "Age"])?;

    let source = Arc::new(MemorySource::with_rows(vec![
        Row::new(1, "A", 1),
        Row::new(2, "B", 1),
        Row::new(3, "C", 2),
    ]));

    let watcher = TableWatcher::new(
        &args.endpoint,
        descriptor,
        source.clone(),
        Arc::new(ConsoleSink),
    );
    source.attach_channel(watcher.channel());
    watcher.start().await?;

    if args.write_interval > 0 {
        let writer = source.clone();
        let interval = Duration::from_secs(args.write_interval);
        tokio::spawn(async move {
            // simulated external writer: grows the watched result set
            let mut next_id = 4;
            loop {
                tokio::time::sleep(interval).await;
                writer.insert(Row::new(next_id, format!("W{next_id}"), 1));
                next_id += 1;
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    watcher.stop();
    Ok(())
}
