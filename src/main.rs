use anyhow::{Context, Result};
use clap::Parser;
use isinscraper::{
    crawl_all,
    fetch::{FetchConfig, TableFetcher, DEFAULT_HOST},
    output::{write_csv, DEFAULT_OUT_PATH},
    sheets::{SheetConfig, SheetUploader},
};
use std::{path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Crawl the listed, OTC and emerging ISIN listings into one CSV.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Where to write the merged CSV
    #[arg(long, default_value = DEFAULT_OUT_PATH)]
    out: PathBuf,

    /// Also replace the "上市櫃" worksheet (needs GSHEET_ID and GOOGLE_SERVICE_ACCOUNT_JSON)
    #[arg(long)]
    upload: bool,

    /// Attempts per market segment
    #[arg(long, default_value_t = 3)]
    max_retry: u32,

    /// Base backoff in seconds; attempt i waits backoff * i
    #[arg(long, default_value_t = 2.0)]
    backoff: f64,

    /// ISIN portal host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) env + logging ────────────────────────────────────────────
    dotenvy::dotenv().ok();
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    info!(?args, "startup");

    // ─── 2) fetcher config ───────────────────────────────────────────
    let backoff = Duration::try_from_secs_f64(args.backoff)
        .with_context(|| format!("invalid --backoff {}", args.backoff))?;
    let config = FetchConfig {
        host: args.host,
        max_retry: args.max_retry,
        backoff,
        ..FetchConfig::default()
    };
    let fetcher = TableFetcher::new(config)?;

    // ─── 3) crawl + merge ────────────────────────────────────────────
    let records = crawl_all(&fetcher).await.context("extracting listing table")?;

    // ─── 4) CSV ──────────────────────────────────────────────────────
    write_csv(&args.out, &records)
        .with_context(|| format!("writing {}", args.out.display()))?;

    // ─── 5) optional sheet upload ────────────────────────────────────
    if args.upload {
        let sheet = SheetConfig::from_env()?;
        SheetUploader::new(sheet)
            .upload(&records)
            .await
            .context("uploading to Google Sheets")?;
    }

    info!(rows = records.len(), "all done");
    Ok(())
}
