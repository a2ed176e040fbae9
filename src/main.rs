//! plfetch - resilient playlist fetcher.
//!
//! Retrieves a playlist guarded by anti-bot defenses by rotating through
//! proxies, optionally rendering it in a headless browser, and writes it
//! atomically once it passes validation.

use plfetch::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "plfetch=info"
    } else {
        "plfetch=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Run CLI
    let code = cli::run().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
