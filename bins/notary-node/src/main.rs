//! notary-node — operator commands over a directory-block database.
//!
//! Inspects the persisted chain, exports it, retries anchoring of persisted
//! blocks, and reconciles anchor confirmations against the Bitcoin wallet
//! node.

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use notary_node_lib::{connect_anchor, export_jsonl, Checkpointer, NodeConfig, WalletAnchor};
use notary_store::{BlockStore, RocksBackend};
use tracing::{info, warn};

type NodeCheckpointer = Checkpointer<RocksBackend, WalletAnchor>;

/// Directory-block notary with Bitcoin anchoring.
#[derive(Parser, Debug)]
#[command(name = "notary-node", version)]
struct Cli {
    /// Config file (TOML). Environment variables prefixed NOTARY__ override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), overriding the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json"), overriding the config file.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the latest directory block and the height caches.
    Tip,
    /// Export directory blocks and anchor records as JSON lines.
    Export(ExportArgs),
    /// Anchor persisted directory blocks that have no anchor record.
    Anchor(AnchorArgs),
    /// Mark anchors confirmed once deep enough in the Bitcoin chain.
    Reconcile(ReconcileArgs),
    /// List anchor records not yet confirmed.
    Unconfirmed,
    /// List persisted directory blocks without an anchor record.
    Unanchored,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output file (default: <data_dir>/export/dirblocks.jsonl).
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnchorArgs {
    /// Height to anchor. Without it, every unanchored block is attempted.
    #[arg(long)]
    height: Option<u64>,

    /// Seconds to wait for each attempt (default: anchor.timeout_secs).
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Confirmations required (default: anchor.required_confirmations).
    #[arg(long)]
    required: Option<u32>,
}

impl Cli {
    /// Load the config file and apply command-line overrides.
    fn load_config(&self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref()).context("Failed to load config")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&config.log_level, &config.log_format);
    info!("notary-node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create directory: {}", config.data_dir.display()))?;
    let store = Arc::new(
        BlockStore::open(config.db_path())
            .with_context(|| format!("Failed to open database at {}", config.db_path().display()))?,
    );

    match cli.command {
        Commands::Tip => cmd_tip(&store),
        Commands::Export(args) => cmd_export(&store, &config, args),
        Commands::Unconfirmed => cmd_unconfirmed(&store),
        Commands::Unanchored => {
            let checkpointer = open_checkpointer(store, &config, false)?;
            cmd_unanchored(&checkpointer)
        }
        Commands::Anchor(args) => {
            let checkpointer = Arc::new(open_checkpointer(store, &config, true)?);
            cmd_anchor(checkpointer, &config, args).await
        }
        Commands::Reconcile(args) => {
            let checkpointer = open_checkpointer(store, &config, true)?;
            let required = args.required.unwrap_or(config.anchor.required_confirmations);
            let report = checkpointer
                .reconcile_anchors(required)
                .context("Reconciliation failed")?;
            println!(
                "checked {} confirmed {} failed {}",
                report.checked, report.confirmed, report.failed
            );
            Ok(())
        }
    }
}

/// Orchestrator over `store`, connected to the wallet when `with_anchor`.
fn open_checkpointer(
    store: Arc<BlockStore<RocksBackend>>,
    config: &NodeConfig,
    with_anchor: bool,
) -> Result<NodeCheckpointer> {
    let anchor = if with_anchor {
        let anchor = connect_anchor(&config.anchor).context("Failed to connect anchor wallet")?;
        if anchor.is_none() {
            bail!("Anchoring is disabled; set anchor.enabled = true");
        }
        anchor
    } else {
        None
    };
    Checkpointer::new(store, anchor, config.network_id).context("Failed to resume checkpointer")
}

fn cmd_tip(store: &BlockStore<RocksBackend>) -> Result<()> {
    match store.latest_height() {
        Some((height, hash)) => {
            let anchored = store
                .anchor_info_by_hash(&hash)
                .context("Failed to read anchor record")?;
            println!("height:    {height}");
            println!("hash:      {hash}");
            match anchored.and_then(|r| r.btc_tx_hash.map(|tx| (tx, r.btc_confirmed))) {
                Some((tx, confirmed)) => println!("anchor:    {tx} (confirmed: {confirmed})"),
                None => println!("anchor:    none"),
            }
        }
        None => println!("height:    none (empty chain)"),
    }
    println!("next_expected_height: {}", store.next_expected_height());
    println!("local_sync_height:    {}", store.local_sync_height());
    Ok(())
}

fn cmd_export(store: &BlockStore<RocksBackend>, config: &NodeConfig, args: ExportArgs) -> Result<()> {
    let path = args.out.unwrap_or_else(|| config.export_path());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let summary = export_jsonl(store, BufWriter::new(file)).context("Export failed")?;
    println!(
        "exported {} blocks and {} anchors to {}",
        summary.blocks,
        summary.anchors,
        path.display()
    );
    Ok(())
}

fn cmd_unconfirmed(store: &BlockStore<RocksBackend>) -> Result<()> {
    let mut records = store
        .unconfirmed_anchor_infos()
        .context("Failed to scan anchor records")?;
    records.sort_by_key(|r| r.db_height);
    for record in &records {
        let tx = record
            .btc_tx_hash
            .map(|tx| tx.to_string())
            .unwrap_or_default();
        println!("{:>8}  {}  {}", record.db_height, record.db_hash, tx);
    }
    println!("{} unconfirmed", records.len());
    Ok(())
}

fn cmd_unanchored(checkpointer: &NodeCheckpointer) -> Result<()> {
    let missing = checkpointer
        .unanchored()
        .context("Failed to scan directory blocks")?;
    for (height, hash) in &missing {
        println!("{height:>8}  {hash}");
    }
    println!("{} unanchored", missing.len());
    Ok(())
}

async fn cmd_anchor(checkpointer: Arc<NodeCheckpointer>, config: &NodeConfig, args: AnchorArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(config.anchor.timeout_secs));
    let heights: Vec<u64> = match args.height {
        Some(height) => vec![height],
        None => checkpointer
            .unanchored()
            .context("Failed to scan directory blocks")?
            .into_iter()
            .map(|(height, _)| height)
            .collect(),
    };

    let mut failures = 0usize;
    for height in heights {
        match Arc::clone(&checkpointer).anchor_with_timeout(height, timeout).await {
            Ok(record) => {
                let tx = record
                    .btc_tx_hash
                    .map(|tx| tx.to_string())
                    .unwrap_or_default();
                println!("{height:>8}  {}  {tx}", record.db_hash);
            }
            Err(e) => {
                warn!(height, error = %e, "anchoring failed");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} anchoring attempt(s) failed");
    }
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_overrides_after_subcommand() {
        let cli = Cli::parse_from(["notary-node", "export", "--data-dir", "/tmp/n", "--out", "x.jsonl"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/n")));
        match cli.command {
            Commands::Export(args) => assert_eq!(args.out, Some(PathBuf::from("x.jsonl"))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn anchor_args_default_to_all_unanchored() {
        let cli = Cli::parse_from(["notary-node", "anchor"]);
        match cli.command {
            Commands::Anchor(args) => {
                assert_eq!(args.height, None);
                assert_eq!(args.timeout_secs, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
