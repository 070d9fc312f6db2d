use anyhow::Context;
use clap::Parser;
use img_squeeze_vault::batch::{BatchPolicy, BatchProcessor, BatchRequest, ItemOutcome, UploadItem};
use img_squeeze_vault::cli::{Args, Commands};
use img_squeeze_vault::codec::ImageCodec;
use img_squeeze_vault::constants::{
    COMPRESSED_SIZE_PREFIX, ERROR_PREFIX, INFO_PREFIX, JOB_TTL_SECS, ORIGINAL_SIZE_PREFIX,
    SUCCESS_PREFIX, SWEEP_INTERVAL_SECS, WARNING_PREFIX,
};
use img_squeeze_vault::logger::init_logging;
use img_squeeze_vault::reaper::Reaper;
use img_squeeze_vault::utils::{
    calculate_compression_ratio, collect_image_files, create_progress_bar, describe_savings,
    format_file_size,
};
use img_squeeze_vault::workspace::{JobStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match args.command {
        Commands::Serve(config) => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    return;
                }
                tracing::info!("Shutdown requested");
                on_signal.cancel();
            });

            img_squeeze_vault::server::serve(config, shutdown)
                .await
                .context("service terminated with an error")?;
        }
        Commands::Batch {
            input,
            format,
            quality,
            recursive,
            workspace_root,
        } => {
            let quiet = args.quiet;
            tokio::task::spawn_blocking(move || {
                run_batch(&input, format, quality, recursive, workspace_root, quiet)
            })
            .await??;
        }
        Commands::Sweep {
            workspace_root,
            orphan_grace_secs,
        } => {
            run_sweep(workspace_root, orphan_grace_secs).await?;
        }
    }

    Ok(())
}

fn run_batch(
    input: &str,
    format: Option<String>,
    quality: Option<String>,
    recursive: bool,
    workspace_root: PathBuf,
    quiet: bool,
) -> anyhow::Result<()> {
    let paths = collect_image_files(input, recursive)?;
    let policy = BatchPolicy::default();
    let request = BatchRequest::resolve(format.as_deref(), quality.as_deref(), &policy)?;

    let items = paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(UploadItem::new(name, bytes))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if !quiet {
        println!(
            "{} Compressing {} files to {} (quality {})",
            INFO_PREFIX,
            items.len(),
            request.format,
            request.quality
        );
    }

    let store = Arc::new(JobStore::new(
        workspace_root,
        Duration::from_secs(JOB_TTL_SECS),
        Arc::new(SystemClock),
    )?);
    let processor = BatchProcessor::new(store, Arc::new(ImageCodec), policy)?;

    let progress = create_progress_bar(items.len() as u64);
    if quiet {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let outcome = processor.process_with_progress(items, &request, &progress)?;
    progress.finish_and_clear();

    if quiet {
        return Ok(());
    }

    let mut total_original = 0u64;
    let mut total_output = 0u64;
    for item in &outcome.outcomes {
        match item {
            ItemOutcome::Success(s) => {
                total_original += s.original_bytes;
                total_output += s.output_bytes;
                println!(
                    "{} {} -> {} (saved {})",
                    SUCCESS_PREFIX,
                    s.original_name,
                    s.output_name,
                    describe_savings(s.saved_bytes)
                );
            }
            ItemOutcome::Failure(f) => {
                println!("{} {}: {}", ERROR_PREFIX, f.original_name, f.kind.friendly_message());
                println!("   {}", f.detail);
            }
        }
    }

    println!();
    println!("{} {}", ORIGINAL_SIZE_PREFIX, format_file_size(total_original));
    println!(
        "{} {} ({:.1}% smaller)",
        COMPRESSED_SIZE_PREFIX,
        format_file_size(total_output),
        calculate_compression_ratio(total_original, total_output)
    );
    println!(
        "{} {} of {} files written to {}",
        INFO_PREFIX,
        outcome.success_count(),
        outcome.outcomes.len(),
        outcome.ticket.dir.display()
    );
    if outcome.success_count() < outcome.outcomes.len() {
        println!("{}  Some files could not be compressed", WARNING_PREFIX);
    }
    Ok(())
}

async fn run_sweep(workspace_root: PathBuf, orphan_grace_secs: u64) -> anyhow::Result<()> {
    let store = Arc::new(JobStore::new(
        workspace_root,
        Duration::from_secs(JOB_TTL_SECS),
        Arc::new(SystemClock),
    )?);
    let reaper = Reaper::new(
        store,
        Duration::from_secs(SWEEP_INTERVAL_SECS),
        Duration::from_secs(orphan_grace_secs),
    );

    let report = tokio::task::spawn_blocking(move || reaper.sweep()).await?;
    println!(
        "{} Removed {} orphaned workspaces ({} failures)",
        INFO_PREFIX, report.orphans_removed, report.failures
    );
    if report.failures > 0 {
        anyhow::bail!("{} workspaces could not be removed", report.failures);
    }
    Ok(())
}
