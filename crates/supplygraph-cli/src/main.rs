//! Supplygraph CLI
//!
//! Thin command-line façade over the supply-chain graph:
//! - Ingesting JSON batches of attestations into a snapshot
//! - Running JSON queries against a snapshot
//! - Seeding a demonstration data set
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use supplygraph_assembler::{AssemblerConfig, CallContext, IngestRequest, SupplyGraph};
use supplygraph_store::MemoryBackend;

mod demo;
mod wire;

#[derive(Parser)]
#[command(name = "supplygraph")]
#[command(author, version, about = "Supplygraph: software supply-chain knowledge graph")]
struct Cli {
    /// Snapshot file (`.sgdb`). Loaded when present, written after ingestion.
    #[arg(long, global = true, default_value = "supplygraph.sgdb")]
    snapshot: PathBuf,

    /// Assembler config (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON array of attestation requests.
    Ingest {
        /// Input batch file
        input: PathBuf,
    },

    /// Run a JSON query and print the results.
    Query {
        /// Query request file
        input: PathBuf,
        /// Compact single-line output
        #[arg(long)]
        compact: bool,
    },

    /// Seed the demonstration data set.
    Demo,

    /// Print node and edge counts.
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AssemblerConfig::from_json_file(path)?,
        None => AssemblerConfig::default(),
    };

    match cli.command {
        Commands::Ingest { input } => cmd_ingest(&cli.snapshot, config, &input),
        Commands::Query { input, compact } => cmd_query(&cli.snapshot, config, &input, compact),
        Commands::Demo => cmd_demo(&cli.snapshot, config),
        Commands::Stats => cmd_stats(&cli.snapshot, config),
    }
}

fn open_graph(snapshot: &Path, config: AssemblerConfig) -> Result<SupplyGraph<MemoryBackend>> {
    let backend = if snapshot.exists() {
        MemoryBackend::load(snapshot)
            .with_context(|| format!("loading snapshot {}", snapshot.display()))?
    } else {
        tracing::info!(path = %snapshot.display(), "starting from an empty graph");
        MemoryBackend::new()
    };
    Ok(SupplyGraph::new(Arc::new(backend), config))
}

fn save_graph(graph: &SupplyGraph<MemoryBackend>, snapshot: &Path) -> Result<()> {
    graph
        .backend()
        .save(snapshot)
        .with_context(|| format!("saving snapshot {}", snapshot.display()))?;
    println!("  {} {}", "→".cyan(), snapshot.display());
    Ok(())
}

fn ingest_and_report(
    graph: &SupplyGraph<MemoryBackend>,
    requests: &[IngestRequest],
) -> Result<()> {
    let report = graph.ingest_batch(&CallContext::background(), requests);
    for line in wire::batch_lines(requests, &report) {
        println!("{}", serde_json::to_string(&line)?);
    }
    println!(
        "{} batch {}: {} created, {} already present, {} failed",
        "Ingested".green().bold(),
        report.batch_id,
        report.created(),
        report.reused(),
        report.failed()
    );
    Ok(())
}

fn cmd_ingest(snapshot: &Path, config: AssemblerConfig, input: &Path) -> Result<()> {
    println!("{} {}", "Ingesting".green().bold(), input.display());

    let text = fs::read_to_string(input)
        .with_context(|| format!("reading batch {}", input.display()))?;
    let requests: Vec<IngestRequest> = serde_json::from_str(&text)
        .with_context(|| format!("parsing batch {}", input.display()))?;

    let graph = open_graph(snapshot, config)?;
    ingest_and_report(&graph, &requests)?;
    save_graph(&graph, snapshot)
}

fn cmd_query(snapshot: &Path, config: AssemblerConfig, input: &Path, compact: bool) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading query {}", input.display()))?;
    let request: wire::QueryRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing query {}", input.display()))?;

    let graph = open_graph(snapshot, config)?;
    let value = request.run(&graph, &CallContext::background())?;
    let out = if compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{out}");
    Ok(())
}

fn cmd_demo(snapshot: &Path, config: AssemblerConfig) -> Result<()> {
    println!("{}", "Seeding demonstration data".green().bold());
    let graph = open_graph(snapshot, config)?;
    let requests = demo::requests()?;
    ingest_and_report(&graph, &requests)?;
    save_graph(&graph, snapshot)
}

fn cmd_stats(snapshot: &Path, config: AssemblerConfig) -> Result<()> {
    let graph = open_graph(snapshot, config)?;
    let stats = graph.stats()?;

    println!("{} {}", "Snapshot".green().bold(), snapshot.display());
    println!("  Nodes: {}", stats.nodes);
    for (kind, count) in &stats.nodes_by_kind {
        println!("    {}: {}", kind.to_string().yellow(), count);
    }
    println!("  Edges: {}", stats.edges);
    for (kind, count) in &stats.edges_by_kind {
        println!("    {}: {}", kind.to_string().yellow(), count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_survives_a_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.sgdb");

        let graph = open_graph(&path, AssemblerConfig::default()).unwrap();
        ingest_and_report(&graph, &demo::requests().unwrap()).unwrap();
        save_graph(&graph, &path).unwrap();

        let reopened = open_graph(&path, AssemblerConfig::default()).unwrap();
        assert_eq!(reopened.stats().unwrap(), graph.stats().unwrap());

        let report = reopened.ingest_batch(&CallContext::background(), &demo::requests().unwrap());
        assert_eq!(report.created(), 0);
        assert_eq!(report.failed(), 0);
    }
}
