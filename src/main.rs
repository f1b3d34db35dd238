//! sourceacquire - autonomous content-acquisition pipeline.
//!
//! Scheduler, change monitor, and resumable crawler with durable
//! content-addressed persistence.

use sourceacquire::cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "sourceacquire=info"
    } else {
        "sourceacquire=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let code = cli::run().await?;
    std::process::exit(code);
}
