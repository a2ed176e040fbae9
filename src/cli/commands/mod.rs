//! CLI parser and command dispatch.

mod config_cmd;
mod fetch;
mod proxies;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "plfetch")]
#[command(about = "Fetch a guarded playlist through rotating proxies or a headless browser")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the playlist and write it atomically to the output path
    Fetch {
        #[command(flatten)]
        overrides: Overrides,
        /// Cancel the whole run after this many seconds
        #[arg(long, env = "PLFETCH_DEADLINE_SECS")]
        deadline_secs: Option<u64>,
    },

    /// Resolve the proxy source and list candidates without fetching
    Proxies {
        #[command(flatten)]
        overrides: Overrides,
        /// Number of candidates to draw (default: max attempts)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags that override configuration file and environment values.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Playlist URL
    #[arg(long)]
    url: Option<String>,
    /// Output file path
    #[arg(short, long)]
    output: Option<String>,
    /// Substring the content must contain (e.g. "#EXTM3U")
    #[arg(long)]
    marker: Option<String>,
    /// Minimum acceptable content length in bytes
    #[arg(long)]
    min_bytes: Option<usize>,
    /// Maximum number of attempts
    #[arg(short = 'n', long)]
    max_attempts: Option<u32>,
    /// Per-attempt timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Base backoff between attempts in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,
    /// Proxy strategy: none, fixed or pool
    #[arg(long)]
    proxy_strategy: Option<String>,
    /// Fixed proxy (host:port, host:port:proto or URL)
    #[arg(long)]
    proxy: Option<String>,
    /// Remote plaintext proxy list URL (implies the pool strategy)
    #[arg(long)]
    pool_url: Option<String>,
    /// Transport: http or browser
    #[arg(short, long)]
    transport: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.url = Some(url);
        }
        if let Some(output) = self.output {
            // Flags are relative to the working directory, not the config file
            let expanded = shellexpand::tilde(&output).into_owned();
            config.output = Some(match std::env::current_dir() {
                Ok(cwd) if !PathBuf::from(&expanded).is_absolute() => {
                    cwd.join(expanded).to_string_lossy().into_owned()
                }
                _ => expanded,
            });
        }
        if let Some(marker) = self.marker {
            config.expected_marker = Some(marker);
        }
        if let Some(min_bytes) = self.min_bytes {
            config.min_bytes = Some(min_bytes);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = Some(max_attempts);
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = Some(timeout);
        }
        if let Some(backoff) = self.backoff_ms {
            config.backoff_ms = Some(backoff);
        }
        if let Some(proxy) = self.proxy {
            config.proxy = Some(proxy);
        }
        if let Some(pool_url) = self.pool_url {
            config.proxy_list_url = Some(pool_url);
            config.proxy_broker_url = None;
            if self.proxy_strategy.is_none() {
                config.proxy_strategy = Some("pool".to_string());
            }
        }
        if let Some(strategy) = self.proxy_strategy {
            config.proxy_strategy = Some(strategy);
        }
        if let Some(transport) = self.transport {
            config.transport = Some(transport);
        }
    }
}

async fn load_config(path: Option<PathBuf>, overrides: Overrides) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(&path).await?
        }
        None => Config::load().await?,
    };

    let mut config = config.with_env_overrides();
    overrides.apply(&mut config);
    Ok(config)
}

/// Run the CLI and return the process exit code.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            overrides,
            deadline_secs,
        } => {
            let config = load_config(cli.config, overrides).await?;
            fetch::cmd_fetch(&config, deadline_secs).await
        }
        Commands::Proxies {
            overrides,
            limit,
            json,
        } => {
            let config = load_config(cli.config, overrides).await?;
            proxies::cmd_proxies(&config, limit, json).await?;
            Ok(0)
        }
        Commands::Config { overrides } => {
            let config = load_config(cli.config, overrides).await?;
            config_cmd::cmd_config_show(&config)?;
            Ok(0)
        }
    }
}
