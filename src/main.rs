use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tagtally::{config::Config, runner};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Append today's metric for every entity in a CSV file, in place.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// CSV file whose first column holds entity names
    table: PathBuf,

    /// YAML file with run settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum simultaneous fetches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Fail the whole run on the first row that cannot be enriched
    #[arg(long)]
    abort_on_error: bool,

    /// Append names to the base URL without percent-encoding
    #[arg(long)]
    raw_names: bool,

    /// Override the base URL names are appended to
    #[arg(long)]
    base_url: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(k) = self.concurrency {
            config.concurrency = k;
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.abort_on_error {
            config.abort_on_error = true;
        }
        if self.raw_names {
            config.raw_names = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    // ─── 2) args + config ────────────────────────────────────────────
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    info!(
        table = %args.table.display(),
        concurrency = config.concurrency,
        abort_on_error = config.abort_on_error,
        "startup"
    );

    // ─── 3) load, enrich, persist ────────────────────────────────────
    runner::run(&args.table, &config).await?;

    info!("all done");
    Ok(())
}
