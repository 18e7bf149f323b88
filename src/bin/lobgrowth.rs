use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use lobstore::lob_store::resolve_store_path;
use lobstore::report::{bytes_description, compaction_summary, json_summary, sample_line};
use lobstore::{GrowthHarness, HarnessConfig, LobStore, Result};

#[derive(Parser)]
#[command(name = "lobgrowth")]
#[command(about = "Shows how a LOB store grows under repeated updates and what closing it reclaims")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Store file path (overrides the config)
    #[arg(short, long)]
    path: Option<PathBuf>,
    /// Number of update iterations
    #[arg(short = 'n', long)]
    iterations: Option<u64>,
    /// Record the store size every N iterations
    #[arg(long)]
    sample_every: Option<u64>,
    /// Entries in the realtime-data map
    #[arg(long)]
    entries: Option<u32>,
    /// Number of rows updated per iteration
    #[arg(long)]
    rows: Option<u64>,
    /// Pause between iterations in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,
    /// Fail unless an explicit compaction reclaims at least this fraction
    #[arg(long)]
    verify: Option<f64>,
    /// Keep an existing store file instead of starting fresh
    #[arg(long)]
    keep: bool,
    /// Print one JSON document instead of progress lines
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(path) = &cli.path {
        config.store_path = path.clone();
    }
    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(sample_every) = cli.sample_every {
        config.sample_every = sample_every;
    }
    if let Some(entries) = cli.entries {
        config.payload.entries = entries;
    }
    if let Some(rows) = cli.rows {
        config.rows = rows;
    }
    if let Some(pause_ms) = cli.pause_ms {
        config.pause_ms = pause_ms;
    }
    if let Some(ratio) = cli.verify {
        config.min_reclaim_ratio = ratio;
    }
    if cli.keep {
        config.fresh = false;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let path = resolve_store_path(&config.store_path)?;

    if config.fresh && path.exists() {
        std::fs::remove_file(&path)?;
    }

    let store = LobStore::open_path(&path, config.store_config())?;
    let mut harness = GrowthHarness::initialize(store, config.rows, config.payload)?
        .with_pause(config.pause())
        .with_min_reclaim_ratio(config.min_reclaim_ratio);

    if !cli.json {
        println!("Store: {}", path.display());
        println!(
            "Initial size: {} ({} rows, payload {})",
            bytes_description(harness.store().current_size_bytes()),
            config.rows,
            bytes_description(harness.payload_len() as u64)
        );
    }

    let started = Instant::now();
    let json = cli.json;
    let run = harness.run_with_progress(config.iterations, config.sample_every, |sample| {
        if !json {
            println!("{}", sample_line(sample));
        }
    })?;

    // Read every row back before closing
    for &row_id in harness.rows() {
        harness.store().get(row_id)?;
    }

    if !json {
        println!(
            "{} iterations in {:.2?}, size {}",
            run.iterations,
            started.elapsed(),
            bytes_description(run.size_after)
        );
    }

    if cli.verify.is_some() {
        let report = harness.verify_compaction()?;
        if !json {
            println!("{}", compaction_summary("Compaction", &report));
        }
    }

    let closed = harness.shutdown()?;
    let on_disk = std::fs::metadata(&path)?.len();

    if json {
        println!("{}", json_summary(&run, &closed)?);
    } else {
        println!("Size before close: {}", bytes_description(closed.size_before));
        println!("Size after close: {}", bytes_description(on_disk));
        println!("{}", compaction_summary("Close", &closed));
    }
    Ok(())
}
