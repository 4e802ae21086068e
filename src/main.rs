//! Serve statements over stdin/stdout.

use evalwire::{Repl, ReplConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries protocol bytes, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ReplConfig::from_env();
    tracing::info!(
        variant = %config.variant,
        max_message_size = config.max_message_size,
        read_chunk_size = config.read_chunk_size,
        "Starting"
    );

    let mut repl = Repl::new(config);
    match repl.run_stdio().await {
        Ok(handled) => {
            tracing::info!("Input closed after {} requests", handled);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Loop terminated: {}", e);
            Err(e.into())
        }
    }
}
