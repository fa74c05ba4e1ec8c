//! CLI argument parsing and command dispatch
//!
//! The thin collaborator surface around the core: load configuration, read
//! specification files (converting YAML to JSON before the core sees bytes),
//! run the stdio serve loop, and format reports for humans.

pub mod args;

pub use args::{Args, Command};

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::CommandFactory;
use humansize::{format_size, BINARY};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::config::Config;
use crate::errors::{Result, SpecdexError};
use crate::rpc;
use crate::service::Service;
use crate::signals;
use crate::status::ExitStatus;
use crate::store::{self, Store};

/// Execute a parsed command line.
pub async fn run(args: Args) -> Result<ExitStatus> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::Ingest {
            spec,
            out,
            name,
            overwrite,
        } => run_ingest(&config, &spec, &out, name, overwrite).await,
        Command::Serve { dir } => run_serve(&config, &dir).await,
        Command::Status { dir, json } => run_status(&config, &dir, json),
        Command::Completions { shell } => {
            let mut command = Args::command();
            clap_complete::generate(shell, &mut command, "specdex", &mut std::io::stdout());
            Ok(ExitStatus::Success)
        }
    }
}

async fn run_ingest(
    config: &Config,
    spec: &Path,
    out: &Path,
    name: Option<String>,
    overwrite: bool,
) -> Result<ExitStatus> {
    let name = name.unwrap_or_else(|| {
        spec.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "api".to_string())
    });

    let bytes = load_spec_bytes(spec)?;
    let store = Store::create(out, config)?;
    let service = Service::new(store, config.clone());

    let report = service
        .ingest(name, bytes, overwrite, &signals::shutdown_token())
        .await?;

    eprintln!(
        "Ingested {} v{} as '{}'{}",
        report.title,
        report.version,
        report.api_name,
        if report.replaced { " (replaced)" } else { "" }
    );
    eprintln!(
        "  {} endpoints, {} schemas, {} categories ({} read in {} ms)",
        report.endpoints,
        report.schemas,
        report.categories,
        format_size(report.bytes_read, BINARY),
        report.elapsed_ms
    );
    for warning in &report.warnings {
        eprintln!("  warning: {}", warning);
    }
    Ok(ExitStatus::Success)
}

/// Newline-delimited JSON-RPC over stdio. Requests are handled concurrently;
/// responses funnel through one writer task so output lines never interleave.
async fn run_serve(config: &Config, dir: &PathBuf) -> Result<ExitStatus> {
    let store = store::open_cached(dir, config)?;
    let service = Service::new(store, config.clone());
    let shutdown = signals::shutdown_token();

    info!(dir = %dir.display(), "serving retrieval protocol on stdio");
    if std::io::stdin().is_terminal() {
        eprintln!("specdex: reading JSON-RPC requests from stdin, one per line");
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let _ = stdout.write_all(response.as_bytes()).await;
            let _ = stdout.write_all(b"\n").await;
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let service = Arc::clone(&service);
        let tx = tx.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let response = rpc::dispatch(&service, &line, &cancel).await;
            let _ = tx.send(response).await;
        });
    }

    drop(tx);
    let _ = writer.await;
    store::shutdown();

    if signals::was_interrupted() {
        Ok(ExitStatus::Interrupted)
    } else {
        Ok(ExitStatus::Success)
    }
}

fn run_status(config: &Config, dir: &Path, json: bool) -> Result<ExitStatus> {
    let store = Store::open(dir, config)?;
    let status = store.status_sync()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("API:        {} ({} v{})", status.name, status.title, status.version);
        println!("Ingested:   {}", status.created_at);
        println!("Digest:     {}", status.digest);
        println!("Endpoints:  {}", status.endpoints);
        println!("Schemas:    {}", status.schemas);
        println!("Categories: {}", status.categories);
        println!(
            "Database:   {} (schema v{})",
            format_size(status.db_size_bytes, BINARY),
            status.schema_version
        );
    }
    Ok(ExitStatus::Success)
}

/// Read a specification file, converting YAML to JSON bytes when the
/// extension says so. The core only ever sees JSON.
fn load_spec_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;

    let is_yaml = path
        .extension()
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false);
    if !is_yaml {
        return Ok(bytes);
    }

    let value: serde_json::Value = serde_yaml::from_slice(&bytes)
        .map_err(|err| SpecdexError::Argument(format!("failed to parse YAML: {}", err)))?;
    Ok(serde_json::to_vec(&value)?)
}
