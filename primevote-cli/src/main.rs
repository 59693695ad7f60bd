//! `primevote` command-line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use primevote_config::{AppConfig, ConfigLoader};
use primevote_core::{PrimeContext, TracingListener, files};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "primevote", version)]
#[command(
    about = "Parallel prime generation over a shared, validated prime store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Configuration file (TOML or JSON); overrides PRIMEVOTE_CONFIG_PATH
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// CSV file backing the prime store (overrides config)
    #[arg(long, global = true, env = "PRIMEVOTE_STORE")]
    store: Option<PathBuf>,

    /// Start with an empty prime set instead of loading the store
    #[arg(long, global = true, default_value_t = false)]
    no_load: bool,

    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate primes with a pool of concurrent workers
    Generate(GenerateArgs),
    /// Print the primes currently in the store
    Show,
    /// Test numbers for primality
    Check {
        #[arg(required = true, allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },
    /// Merge primes from a CSV or JSON file into the set
    Import {
        path: PathBuf,
        /// Write the merged set back to the store
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Write the current set to a CSV or JSON file
    Export {
        path: PathBuf,
        /// Output format; inferred from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<FileFormat>,
    },
    /// Stream primes through the bounded queue to a batching consumer
    Pipeline(PipelineArgs),
    /// Repeat generation runs and report aggregate statistics
    Stats(StatsArgs),
}

/// Generation knobs shared by `generate` and `stats`. Unset values come
/// from the configuration file.
#[derive(ClapArgs, Debug, Clone)]
struct RunArgs {
    /// Number of workers (1-10)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Largest candidate to sample (100-10000)
    #[arg(short, long)]
    upper_bound: Option<i64>,

    /// Distinct primes each worker must find (1-100)
    #[arg(short = 'n', long)]
    per_worker: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to wait before cancelling outstanding workers
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Persist the resulting set to the store
    #[arg(long, default_value_t = false)]
    save: bool,

    /// Print the run summary as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct PipelineArgs {
    /// How many primes the producer pushes through the queue
    #[arg(short, long, default_value_t = 25)]
    count: usize,

    /// Largest batch the consumer drains at once
    #[arg(short, long, default_value_t = 5)]
    batch: usize,

    /// Queue capacity (overrides config; 0 is unbounded)
    #[arg(long)]
    capacity: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone)]
struct StatsArgs {
    /// Number of generation runs to aggregate
    #[arg(short, long, default_value_t = 3)]
    runs: usize,

    #[command(flatten)]
    run: RunArgs,

    /// Print the statistics as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.global.config {
        loader = loader.with_config_path(path);
    }
    let load = loader.load().context("failed to load configuration")?;
    load.warnings.log();

    let mut config = load.config;
    if let Some(store) = &cli.global.store {
        config.storage.csv_path = store.clone();
    }
    if cli.global.no_load {
        config.storage.load_on_startup = false;
    }

    let queue_capacity = match &cli.command {
        Command::Pipeline(args) => args.capacity.unwrap_or(config.queue.capacity),
        _ => config.queue.capacity,
    };
    let ctx = PrimeContext::new(config.topic.clone(), queue_capacity);
    ctx.bus().subscribe(Arc::new(TracingListener));
    load_store(&ctx, &config)?;

    match cli.command {
        Command::Generate(args) => commands::generate(&ctx, &config, &args).await,
        Command::Show => commands::show(&ctx),
        Command::Check { numbers } => commands::check(&ctx, &numbers),
        Command::Import { path, save } => commands::import(&ctx, &config, &path, save),
        Command::Export { path, format } => commands::export(&ctx, &path, format),
        Command::Pipeline(args) => commands::pipeline(&ctx, &args).await,
        Command::Stats(args) => commands::stats(&ctx, &config, &args).await,
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "warn,primevote=info",
        _ => "info,primevote=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_store(ctx: &PrimeContext, config: &AppConfig) -> anyhow::Result<()> {
    let path = &config.storage.csv_path;
    if !config.storage.load_on_startup {
        debug!(target: "primevote::files", "store loading disabled");
        return Ok(());
    }
    if !path.exists() {
        info!(target: "primevote::files", path = %path.display(), "no prime store yet");
        return Ok(());
    }
    files::load_csv(path, ctx.primes())
        .with_context(|| format!("failed to load prime store {}", path.display()))?;
    Ok(())
}
