use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{ArgGroup, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use pdfrag::config::load_config;
use pdfrag::logging::init_logging;
use pdfrag::store::Metadata;
use pdfrag::{DocumentLookup, IngestService};

/// Ingest PDFs into a searchable vector index.
#[derive(Parser)]
#[command(name = "pdfrag")]
#[command(version)]
#[command(about = "PDF ingestion pipeline with a local vector index", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true, env = "PDFRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging for pdfrag
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one file on the current thread
    Process {
        file: PathBuf,

        /// Document title (defaults to the file name without extension)
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Run the worker pool and directory watcher until interrupted
    Serve,

    /// Queue files through the upload path and wait for the jobs
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        timeout: u64,
    },

    /// Search indexed chunks
    Search {
        query: String,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Print a stored document
    #[command(group(ArgGroup::new("lookup").required(true).args(["id", "title"])))]
    Show {
        #[arg(long)]
        id: Option<i64>,

        #[arg(long)]
        title: Option<String>,
    },

    /// List files with recorded failures
    Failures,

    /// Reset the failure state of a file so the watcher retries it
    ClearFailure { path: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level, config.logging.format, cli.verbose);

    let service = match IngestService::new(config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&service, cli.command);
    service.shutdown(true);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(service: &IngestService, command: Commands) -> Result<(), String> {
    match command {
        Commands::Process { file, title } => {
            let outcome = service
                .process_file(&file, title.as_deref(), Metadata::new())
                .map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({
                "document_id": outcome.document.id,
                "title": outcome.document.title,
                "duplicate": outcome.duplicate,
                "chunks": outcome.chunks,
            }))
        }
        Commands::Serve => serve(service),
        Commands::Ingest { files, timeout } => ingest(service, &files, timeout),
        Commands::Search { query, top_k } => {
            let hits = service.search(&query, top_k).map_err(|e| e.to_string())?;
            print_json(&hits)
        }
        Commands::Show { id, title } => {
            let lookup = match (id, title) {
                (Some(id), _) => DocumentLookup::Id(id),
                (None, Some(title)) => DocumentLookup::Title(title),
                (None, None) => return Err("either --id or --title is required".to_string()),
            };
            match service.fetch_text(&lookup).map_err(|e| e.to_string())? {
                Some(document) => print_json(&document),
                None => Err(format!("Document not found: {:?}", lookup)),
            }
        }
        Commands::Failures => {
            let failures = service.failures().map_err(|e| e.to_string())?;
            print_json(&failures)
        }
        Commands::ClearFailure { path } => {
            if service.clear_failure(&path).map_err(|e| e.to_string())? {
                println!("Cleared failure state for {}", path.display());
            } else {
                println!("No failure state recorded for {}", path.display());
            }
            Ok(())
        }
    }
}

fn serve(service: &IngestService) -> Result<(), String> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| format!("Failed to set Ctrl-C handler: {}", e))?;

    if service.start_watcher().map_err(|e| e.to_string())? {
        info!(
            "Serving; watching {} (Ctrl-C to stop)",
            service.config().watch_dir().display()
        );
    } else {
        info!("Serving without a watcher (Ctrl-C to stop)");
    }

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

fn ingest(service: &IngestService, files: &[PathBuf], timeout: u64) -> Result<(), String> {
    let mut ids = Vec::with_capacity(files.len());
    for file in files {
        let bytes =
            std::fs::read(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
        let name = file_name(file);
        match service.upload(&name, &bytes) {
            Ok(job) => ids.push(job.id),
            Err(e) => error!("Could not queue {}: {}", file.display(), e),
        }
    }

    let snapshot = service.wait_for_jobs(&ids, Some(Duration::from_secs(timeout)));
    print_json(&snapshot)?;
    if snapshot.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} job(s) failed", snapshot.failed.len()))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
