//! # heapscope - Main Entry Point
//!
//! Loads a capture, symbolicates it in the background with a progress line,
//! then prints the per-library breakdown. Ctrl+C stops symbolication early;
//! whatever was resolved so far is still reported.

#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use heapscope::analysis::LibraryAggregate;
use heapscope::capture::load_snapshot;
use heapscope::classification::FrameClassifier;
use heapscope::cli::Args;
use heapscope::domain::{CaptureError, LibraryMapping};
use heapscope::engine::HeapEngine;
use heapscope::pipeline::{LibraryPager, PipelineEvent};
use heapscope::symbolization::{read_library_maps, SymbolizerConfig};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOINPUT: i32 = 66;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(is_missing_input) {
        EXIT_NOINPUT
    } else {
        EXIT_ERROR
    }
}

fn is_missing_input(cause: &(dyn std::error::Error + 'static)) -> bool {
    let io_error = match cause.downcast_ref::<CaptureError>() {
        Some(CaptureError::Io(e)) => Some(e),
        _ => cause.downcast_ref::<io::Error>(),
    };
    io_error.is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = SymbolizerConfig::from_env(args.symbols.clone(), args.symbolizer.clone())
        .context("Failed to load symbolizer configuration")?;

    let current = Arc::new(
        load_snapshot(&args.capture)
            .with_context(|| format!("Failed to load capture {}", args.capture.display()))?,
    );
    let backup = args
        .backup
        .as_ref()
        .map(|path| {
            load_snapshot(path).with_context(|| format!("Failed to load backup {}", path.display()))
        })
        .transpose()?;
    let mappings: Arc<[LibraryMapping]> = read_library_maps(&args.maps)
        .with_context(|| format!("Failed to read library maps {}", args.maps.display()))?
        .into();

    if !quiet {
        println!("heapscope v{}", env!("CARGO_PKG_VERSION"));
        println!("capture: {} ({} records)", args.capture.display(), current.len());
        println!("libraries: {}", mappings.len());
        println!("symbols: {}", config.symbols_root.display());
    }

    let mut engine = HeapEngine::new(config, FrameClassifier::new(args.instrumentation_libraries()));

    if let Some(backup) = &backup {
        if !current.is_refinement_of(backup) {
            warn!(
                "Backup is from {} but capture is from {}, showing the full capture",
                backup.session(),
                current.session()
            );
        }
    }
    let view = engine.prepare_view(Arc::clone(&current), backup.as_ref());

    // ── Symbolication ───────────────────────────────────────────────────
    let events = engine
        .symbolicate_with_events(Arc::clone(&view.snapshot), mappings)
        .context("Failed to start symbolication")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut exit_reason = "interrupted";
    'poll: loop {
        loop {
            match events.try_recv() {
                Ok(PipelineEvent::Progress { completed, total }) => {
                    if !quiet {
                        eprint!("\rsymbolicating: {completed}/{total}");
                    }
                }
                Ok(PipelineEvent::Done) => {
                    exit_reason = "done";
                    break 'poll;
                }
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                // Worker ended without reporting completion
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    exit_reason = "worker stopped";
                    break 'poll;
                }
            }
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => break,
        }
    }

    let state = if exit_reason == "done" { engine.wait() } else { engine.cancel() };
    if !quiet {
        eprintln!();
        eprintln!(
            "{exit_reason}: {}/{} records resolved",
            view.snapshot.resolved_count(),
            view.snapshot.len()
        );
    }
    info!("Symbolication finished in state {state:?}");

    // ── Report ──────────────────────────────────────────────────────────
    let filtered = args.display.filter(&view.snapshot);
    println!("{}", filtered.summary());
    if let Some(delta) = view.delta {
        println!("Memory Difference: {delta} Bytes");
    }

    let libraries = engine.aggregator().aggregate_records(&filtered.records);
    print_library_table(&libraries, args.top);

    if let Some(name) = &args.library {
        match libraries.iter().find(|l| &l.library == name) {
            Some(library) => print_library_records(&engine, Arc::new(library.clone()))?,
            None => warn!("No allocations attributed to {name}"),
        }
    }

    if let Some(path) = &args.save {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        engine
            .exporter()
            .export(&filtered.records, BufWriter::new(file))
            .context("Failed to save allocations")?;
        if !quiet {
            println!("saved: {}", path.display());
        }
    }

    engine.shutdown();
    Ok(())
}

fn print_library_table(libraries: &[LibraryAggregate], top: usize) {
    let shown = if top == 0 { libraries.len() } else { top.min(libraries.len()) };
    let width = libraries[..shown].iter().map(|l| l.library.len()).max().unwrap_or(0).max(7);

    println!();
    println!("{:<width$}  {:>12}  {:>8}", "LIBRARY", "SIZE", "COUNT");
    for library in &libraries[..shown] {
        println!("{:<width$}  {:>12}  {:>8}", library.library, library.total_size, library.total_count);
    }
    if shown < libraries.len() {
        println!("... {} more", libraries.len() - shown);
    }
}

/// List a library's allocations, streamed in chunks from a pager task
fn print_library_records(engine: &HeapEngine, library: Arc<LibraryAggregate>) -> Result<()> {
    println!();
    println!("{} ({} allocations):", library.library, library.records.len());

    let exporter = engine.exporter().clone();
    let mut pager = LibraryPager::new();
    pager
        .select(library, move |_start, chunk| {
            let mut out = io::stdout().lock();
            for record in chunk {
                let _ = writeln!(out, "  {}", exporter.format_record(record));
            }
        })
        .context("Failed to start library pager")?;
    pager.wait();
    Ok(())
}

