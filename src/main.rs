//! Bid crawler: one acquisition run over the configured procurement sites.
//!
//! Loads the TOML config, crawls every enabled site, curates the merged
//! records and writes a dated JSON report into the data directory.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bid_crawler::config::{self, AppConfig};
use bid_crawler::report::{self, RunReport};
use bid_crawler::{DetailMode, HttpFetcher, ParserRegistry, Pipeline, PipelineError};

const DEFAULT_LOG_FILTER: &str = "bid_crawler=info,fetch=info,crawl=info,curate=info,pipeline=info,warn";
const VERBOSE_LOG_FILTER: &str =
    "bid_crawler=debug,fetch=debug,crawl=debug,curate=debug,pipeline=debug,info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Collect and curate tender announcements from procurement sites", long_about = None)]
struct Cli {
    /// Config file (default: $BID_CRAWLER_CONFIG, then config/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum list pages per site (overrides the config file)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Skip detail pages
    #[arg(long, conflicts_with = "detail")]
    list_only: bool,

    /// Fetch detail pages to fill budget, deadline and contacts
    #[arg(long)]
    detail: bool,

    /// Output directory for the JSON report (overrides output.data_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = if verbose {
        EnvFilter::new(fallback)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn apply_overrides(cfg: &mut AppConfig, cli: &Cli) {
    if let Some(n) = cli.max_pages {
        cfg.crawler.max_pages = n;
    }
    if cli.list_only {
        cfg.crawler.detail_mode = DetailMode::ListOnly;
    } else if cli.detail {
        cfg.crawler.detail_mode = DetailMode::Enrich;
    }
    if let Some(dir) = &cli.output {
        cfg.output.data_dir = dir.display().to_string();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load_default()?,
    };
    apply_overrides(&mut cfg, &cli);

    let registry = ParserRegistry::builtin();
    for w in cfg.validate(&registry) {
        warn!(target: "pipeline", "config: {w}");
    }

    let fetcher = HttpFetcher::from_config(&cfg.crawler).context("building HTTP client")?;
    let pipeline = Pipeline::new(Arc::new(fetcher), registry, cfg.crawler.crawl_settings())
        .with_timeout(cfg.crawler.run_timeout());

    // Ctrl-C stops new requests; whatever was gathered is still curated.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "pipeline", "interrupted; finishing with partial results");
            on_signal.cancel();
        }
    });

    info!(
        target: "pipeline",
        sites = cfg.enabled_sites().len(),
        keywords = cfg.keywords().len(),
        "starting run"
    );
    let mut seen: HashSet<String> = HashSet::new();
    let outcome = match pipeline
        .run_once(
            &cfg.websites,
            &cfg.enabled_industries(),
            &cfg.filter_policy(),
            &mut seen,
            &cancel,
        )
        .await
    {
        Ok(o) => o,
        Err(PipelineError::AllSitesFailed { statuses }) => {
            for s in &statuses {
                println!("  {s}");
            }
            error!(target: "pipeline", "every enabled site failed; no report written");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            error!(target: "pipeline", error = %e, "run aborted");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Sites:");
    for s in &outcome.statuses {
        println!("  {s}");
    }
    let st = &outcome.stats;
    println!(
        "Curation: {} in, {} duplicates, {} without keywords, {} out of date, {} out of budget, {} title terms, {} kept",
        st.input, st.duplicates, st.no_keywords, st.out_of_date, st.out_of_amount, st.title_terms, st.passed
    );

    let data_dir = PathBuf::from(&cfg.output.data_dir);
    if cfg.output.save_raw_data {
        let raw = report::write_raw_records(&outcome.records, outcome.generated_at, &data_dir)?;
        info!(target: "pipeline", path = %raw.display(), "records saved");
    }
    let report = RunReport::new(outcome);
    let path = report::write_json(&report, &data_dir)?;
    println!("Report: {}", path.display());

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env may carry BID_CRAWLER_CONFIG / RUST_LOG for local runs.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(target: "pipeline", error = ?e, "bid-crawler failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
