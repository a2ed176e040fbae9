//! Proxy source dry run.

use console::style;

use crate::cli::icons::{info, warn};
use crate::config::Config;
use crate::proxy::ProxySource;

/// Resolve the configured proxy source and print the candidates it yields.
pub async fn cmd_proxies(config: &Config, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let strategy = config.proxy_strategy()?;
    let limit = match limit {
        Some(limit) => limit,
        None => config.retry_policy()?.max_attempts() as usize,
    };

    eprintln!(
        "{} Resolving {} proxy source (up to {} candidate(s))",
        info(),
        style(strategy.name()).cyan(),
        limit
    );

    let descriptors: Vec<_> = ProxySource::resolve(&strategy, limit).await.collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    if descriptors.is_empty() {
        eprintln!("{} No candidates available", warn());
        return Ok(());
    }

    for (i, descriptor) in descriptors.iter().enumerate() {
        println!("{:>3}. {}", i + 1, descriptor);
    }
    Ok(())
}
