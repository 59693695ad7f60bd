use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use primevote_config::AppConfig;
use primevote_core::{
    GenerationConfig, PoolSettings, PrimeContext, RunSummary, WorkerPool, files,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{FileFormat, GenerateArgs, PipelineArgs, RunArgs, StatsArgs};

const PRIMES_PER_LINE: usize = 10;

pub(crate) async fn generate(ctx: &PrimeContext, config: &AppConfig, args: &GenerateArgs) -> Result<()> {
    let (generation, settings) = resolve_run(config, &args.run);
    let summary = run_pool(ctx, generation, settings).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        print_primes(&ctx.primes().snapshot_sorted());
    }

    if args.save {
        save_store(ctx, config)?;
    }
    Ok(())
}

pub(crate) fn show(ctx: &PrimeContext) -> Result<()> {
    print_primes(&ctx.primes().snapshot_sorted());
    if let Some(sample) = ctx.primes().pick_random() {
        println!("random pick: {sample}");
    }
    Ok(())
}

pub(crate) fn check(ctx: &PrimeContext, numbers: &[i64]) -> Result<()> {
    for &n in numbers {
        if ctx.oracle().is_prime(n) {
            println!("{n} is prime");
        } else {
            println!("{n} is not prime");
        }
    }
    Ok(())
}

pub(crate) fn import(ctx: &PrimeContext, config: &AppConfig, path: &Path, save: bool) -> Result<()> {
    let (report, unparsable) = match infer_format(path, None) {
        FileFormat::Json => {
            let report = files::import_json(path, ctx.primes())
                .with_context(|| format!("failed to import {}", path.display()))?;
            (report, 0)
        }
        FileFormat::Csv => {
            let loaded = files::load_csv(path, ctx.primes())
                .with_context(|| format!("failed to import {}", path.display()))?;
            (loaded.report, loaded.unparsable)
        }
    };

    println!(
        "added {}, duplicates {}, rejected {}, unparsable {}",
        report.added, report.duplicates, report.rejected, unparsable
    );
    println!("set now holds {} primes", ctx.primes().count());
    if save {
        save_store(ctx, config)?;
    }
    Ok(())
}

pub(crate) fn export(ctx: &PrimeContext, path: &Path, format: Option<FileFormat>) -> Result<()> {
    let count = match infer_format(path, format) {
        FileFormat::Json => {
            files::export_json(path, ctx.primes())
                .with_context(|| format!("failed to export {}", path.display()))?
                .count
        }
        FileFormat::Csv => {
            let primes = ctx.primes().snapshot_sorted();
            files::write_csv(path, &primes)
                .with_context(|| format!("failed to export {}", path.display()))?;
            primes.len()
        }
    };
    println!("exported {count} primes to {}", path.display());
    Ok(())
}

/// Pushes primes through the shared queue from one blocking producer to one
/// batching consumer and prints each batch as it is drained.
pub(crate) async fn pipeline(ctx: &PrimeContext, args: &PipelineArgs) -> Result<()> {
    let primes = pipeline_source(ctx, args.count);
    let expected = primes.len();
    let batch_size = args.batch.max(1);
    let token = CancellationToken::new();

    let producer = {
        let queue = Arc::clone(ctx.queue());
        let token = token.clone();
        tokio::task::spawn_blocking(move || -> primevote_core::Result<()> {
            for prime in primes {
                queue.offer_cancellable(prime, &token)?;
            }
            Ok(())
        })
    };

    let consumer = {
        let queue = Arc::clone(ctx.queue());
        let bus = Arc::clone(ctx.bus());
        let token = token.clone();
        tokio::task::spawn_blocking(move || -> primevote_core::Result<usize> {
            let mut received = 0;
            let mut batches = 0;
            while received < expected {
                let batch = queue.poll_batch_cancellable(batch_size, &token)?;
                batches += 1;
                received += batch.len();
                let rendered: Vec<String> = batch.iter().map(i64::to_string).collect();
                println!("batch {batches}: {}", rendered.join(", "));
                bus.publish_text(format!("consumer drained {} primes", batch.len()));
            }
            Ok(batches)
        })
    };

    let produced = producer.await.context("producer task failed")?;
    if let Err(err) = produced {
        token.cancel();
        return Err(err).context("producer stopped early");
    }
    let batches = consumer
        .await
        .context("consumer task failed")?
        .context("consumer stopped early")?;

    println!(
        "moved {expected} primes in {batches} batches ({} queue operations)",
        ctx.queue().operations_count()
    );
    Ok(())
}

pub(crate) async fn stats(ctx: &PrimeContext, config: &AppConfig, args: &StatsArgs) -> Result<()> {
    let (generation, settings) = resolve_run(config, &args.run);
    for _ in 0..args.runs {
        // Each run starts from an empty set so repeated primes show up in
        // the frequency table.
        ctx.primes().clear();
        let summary = run_pool(ctx, generation, settings).await?;
        if !summary.completed() {
            warn!(target: "primevote::pool", status = %summary.status, "run did not complete");
        }
    }

    let snapshot = ctx.stats().snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    println!("runs: {}", snapshot.runs);
    println!("primes generated: {}", snapshot.primes_generated);
    println!("processing time: {} ms", snapshot.processing_ms);
    println!("most frequent primes:");
    for (prime, count) in &snapshot.top {
        println!("  {prime} x{count}");
    }
    Ok(())
}

fn resolve_run(config: &AppConfig, args: &RunArgs) -> (GenerationConfig, PoolSettings) {
    let requested = GenerationConfig {
        worker_count: args.workers.unwrap_or(config.generation.worker_count),
        upper_bound: args.upper_bound.unwrap_or(config.generation.upper_bound),
        target_per_worker: args
            .per_worker
            .unwrap_or(config.generation.target_per_worker),
    };
    let generation = requested.clamped();
    if generation != requested {
        warn!(
            target: "primevote::config",
            requested = ?requested,
            using = ?generation,
            "generation parameters clamped into range"
        );
    }

    let mut settings = config.pool_settings();
    if let Some(seed) = args.seed {
        settings.seed = Some(seed);
    }
    if let Some(secs) = args.deadline_secs {
        settings.deadline = std::time::Duration::from_secs(secs.max(1));
    }
    (generation, settings)
}

/// Runs one generation round, cancelling it on Ctrl-C.
async fn run_pool(
    ctx: &PrimeContext,
    generation: GenerationConfig,
    settings: PoolSettings,
) -> Result<RunSummary> {
    let pool = WorkerPool::new(ctx.clone(), settings);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "primevote::pool", "interrupt received, stopping workers");
            trigger.cancel();
        }
    });

    let result = pool.run_with_shutdown(generation, &shutdown).await;
    signal.abort();
    result.context("generation run failed")
}

fn save_store(ctx: &PrimeContext, config: &AppConfig) -> Result<()> {
    let path = &config.storage.csv_path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let primes = ctx.primes().snapshot_sorted();
    files::write_csv(path, &primes)
        .with_context(|| format!("failed to save prime store {}", path.display()))?;
    println!("saved {} primes to {}", primes.len(), path.display());
    Ok(())
}

fn infer_format(path: &Path, explicit: Option<FileFormat>) -> FileFormat {
    explicit.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
        _ => FileFormat::Csv,
    })
}

/// Primes from the store, topped up with the next primes above its largest
/// member until `count` are available.
fn pipeline_source(ctx: &PrimeContext, count: usize) -> Vec<i64> {
    let mut primes = ctx.primes().snapshot_sorted();
    primes.truncate(count);
    let mut next = primes.last().map_or(2, |last| last + 1);
    while primes.len() < count {
        if ctx.oracle().is_prime(next) {
            primes.push(next);
        }
        next += 1;
    }
    primes
}

fn print_summary(summary: &RunSummary) {
    println!(
        "generation {}: {} primes found by {} workers in {} ms",
        summary.status,
        summary.primes_found,
        summary.workers.len(),
        summary.elapsed_ms
    );
    for worker in &summary.workers {
        println!(
            "  worker {}: {} primes in {} iterations ({:?})",
            worker.worker_id, worker.found, worker.iterations, worker.outcome
        );
    }
}

fn print_primes(primes: &[i64]) {
    println!("{} primes in set", primes.len());
    for line in primes.chunks(PRIMES_PER_LINE) {
        let rendered: Vec<String> = line.iter().map(i64::to_string).collect();
        println!("  {}", rendered.join(", "));
    }
}
