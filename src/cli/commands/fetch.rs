//! Fetch command.

use std::time::Duration;

use console::style;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::icons::{dim_arrow, error, info, success};
use crate::config::Config;
use crate::pipeline::{self, PipelineError, EXIT_OK};

/// Fetch the configured playlist. Returns the process exit code.
pub async fn cmd_fetch(config: &Config, deadline_secs: Option<u64>) -> anyhow::Result<i32> {
    let job = config.resolve()?;
    let cancel = CancellationToken::new();

    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling fetch");
                cancel.cancel();
            }
        }
    });

    let deadline = deadline_secs.map(|secs| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Deadline of {}s reached, cancelling fetch", secs);
            cancel.cancel();
        })
    });

    eprintln!(
        "{} Fetching {} ({} strategy, {} transport)",
        info(),
        style(&job.target.url).cyan(),
        job.strategy.name(),
        job.transport
    );

    let result = pipeline::run(&job, &cancel).await;

    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }

    match result {
        Ok(delivery) => {
            eprintln!(
                "{} Wrote {} bytes to {}",
                success(),
                delivery.persisted.bytes_written,
                style(delivery.persisted.path.display()).bold()
            );
            eprintln!(
                "  {} via {} on attempt {}",
                dim_arrow(),
                delivery.descriptor_used,
                delivery.attempts_used
            );
            eprintln!(
                "  {} sha256 {}",
                dim_arrow(),
                &delivery.persisted.sha256[..16]
            );
            Ok(EXIT_OK)
        }
        Err(e) => {
            print_failure(&e);
            Ok(e.exit_code())
        }
    }
}

fn print_failure(e: &PipelineError) {
    let headline = match e {
        PipelineError::Exhausted { .. } => "All attempts failed".to_string(),
        PipelineError::Cancelled { .. } => "Fetch cancelled".to_string(),
        other => other.to_string(),
    };
    eprintln!("{} {}", error(), headline);

    if let Some(report) = e.report() {
        if let Some(diagnosis) = report.diagnosis {
            eprintln!("  {} {}", dim_arrow(), style(diagnosis).yellow());
        }
        for record in &report.recent {
            eprintln!("  {} {}", dim_arrow(), record);
        }
    }
}
