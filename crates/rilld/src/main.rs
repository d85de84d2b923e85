//! `rilld`: the Rill node daemon.
//!
//! # Usage
//!
//! ```text
//! rilld create "some text"                  # append an entry to the local node
//! rilld create -c rill.toml "some text"     # with a config file
//! rilld inspect                             # verify every stored author chain
//! rilld simulate -n 3 --updates 2           # in-process N-node replication run
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rill_chain::{ActionChain, ChainStore};
use rill_engine::{
    ConvergencePolicy, EntryEngine, RillNode, RillNodeConfig, TextEntry, UpdateEntryInput,
};
use rill_graph::RevisionGraph;
use rill_net::{MessageHandler, SimNetwork};
use rill_store::{ContentStore, FileStore, MemoryStore};
use rill_types::NodeId;
use tracing::{info, warn};

use config::CliConfig;

const SAMPLE_TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "rilld", version, about = "Rill replicated entry store")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory.
    #[arg(short, long, global = true, env = "RILL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a text entry to the local node's chain.
    Create {
        /// Entry text.
        text: String,
    },

    /// Verify every author chain in the local store and list entries.
    Inspect,

    /// Run an in-process replication scenario and print each node's view.
    Simulate {
        /// Number of nodes.
        #[arg(short = 'n', long, default_value = "3")]
        nodes: usize,

        /// Number of chained updates after the create.
        #[arg(short, long, default_value = "2")]
        updates: usize,

        /// Drop this many messages at the start of the run.
        #[arg(long, default_value = "0")]
        drop: usize,

        /// Maximum random delivery delay in milliseconds.
        #[arg(long, default_value = "0")]
        jitter_ms: u64,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Create { text } => cmd_create(&config, &text).await,
        Commands::Inspect => cmd_inspect(&config),
        Commands::Simulate {
            nodes,
            updates,
            drop,
            jitter_ms,
        } => cmd_simulate(&config, nodes, updates, drop, jitter_ms).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// Node setup
// -----------------------------------------------------------------------

/// Load the node's signing key from `data_dir/node.key`, creating it if needed.
fn load_or_create_signing_key(data_dir: &Path) -> Result<SigningKey> {
    let key_path = data_dir.join("node.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("failed to read node.key")?;
        anyhow::ensure!(bytes.len() == 32, "node.key must be exactly 32 bytes");
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        let key = SigningKey::from_bytes(&arr);
        info!(path = %key_path.display(), "loaded existing node key");
        Ok(key)
    } else {
        let key = SigningKey::from_bytes(&random_seed());
        std::fs::write(&key_path, key.to_bytes()).context("failed to write node.key")?;
        info!(path = %key_path.display(), "generated new node key");
        Ok(key)
    }
}

fn random_seed() -> [u8; 32] {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

fn node_id_for(config: &CliConfig, key: &SigningKey) -> NodeId {
    if config.node.name.is_empty() {
        NodeId::from(key.verifying_key().to_bytes())
    } else {
        NodeId::from_data(config.node.name.as_bytes())
    }
}

/// Open the local node described by `config`.
fn open_node(config: &CliConfig) -> Result<RillNode> {
    let (key, content, chain): (SigningKey, Arc<dyn ContentStore>, ChainStore) =
        if config.memory_mode() {
            info!("using in-memory stores");
            (
                SigningKey::from_bytes(&random_seed()),
                Arc::new(MemoryStore::new(config.storage.memory_max_bytes)),
                ChainStore::in_memory(),
            )
        } else {
            std::fs::create_dir_all(&config.node.data_dir)
                .context("failed to create data directory")?;
            let key = load_or_create_signing_key(&config.node.data_dir)?;
            let content = FileStore::new(config.content_dir())
                .context("failed to initialize content store")?;
            let chain =
                ChainStore::open(config.chain_dir()).context("failed to open chain store")?;
            (key, Arc::new(content), chain)
        };

    let node_config = RillNodeConfig {
        node_id: node_id_for(config, &key),
        max_entry_bytes: config.storage.max_entry_bytes,
        sync: config.sync_config(),
        ..RillNodeConfig::default()
    };
    Ok(RillNode::new(node_config, key, content, chain)?)
}

// -----------------------------------------------------------------------
// rilld create
// -----------------------------------------------------------------------

async fn cmd_create(config: &CliConfig, text: &str) -> Result<()> {
    let node = open_node(config)?;
    let origin = node.create_entry(TextEntry::new(text).to_bytes()?).await?;
    println!("{origin}");
    Ok(())
}

// -----------------------------------------------------------------------
// rilld inspect
// -----------------------------------------------------------------------

fn cmd_inspect(config: &CliConfig) -> Result<()> {
    let path = config.chain_dir();
    let store = ChainStore::open(&path).map_err(|e| {
        anyhow::anyhow!(
            "cannot open chain store at {}. Is another rilld using it? ({e})",
            path.display(),
        )
    })?;
    let chain = ActionChain::new(store);

    let authors = chain.authors()?;
    println!("Authors: {}", authors.len());
    let mut broken = 0;
    for author in &authors {
        match chain.verify_chain(author) {
            Ok(len) => println!("  {} ok ({len} actions)", author.short()),
            Err(e) => {
                broken += 1;
                println!("  {} BROKEN: {e}", author.short());
            }
        }
    }

    let actions = chain.all_actions()?;
    let graph = RevisionGraph::from_actions(&actions);
    let origins = graph.origins();
    println!("Entries: {}", origins.len());
    for origin in &origins {
        let revisions = graph.all_revisions(origin).len();
        let deletes = graph.lineage_delete_hashes(origin).len();
        println!(
            "  {} revisions={revisions} deletes={deletes}",
            origin.short()
        );
    }

    anyhow::ensure!(broken == 0, "{broken} chain(s) failed verification");
    Ok(())
}

// -----------------------------------------------------------------------
// rilld simulate
// -----------------------------------------------------------------------

async fn cmd_simulate(
    config: &CliConfig,
    count: usize,
    updates: usize,
    drop: usize,
    jitter_ms: u64,
) -> Result<()> {
    anyhow::ensure!(count >= 2, "a simulation needs at least 2 nodes");
    let sync = config.sync_config();

    println!("Rill Simulation");
    println!("  nodes:   {count}");
    println!("  updates: {updates}");
    println!("  dropped: {drop}");
    println!("  jitter:  {jitter_ms} ms");
    println!();

    let net = SimNetwork::new();
    net.set_jitter(Duration::from_millis(jitter_ms));

    let mut nodes: Vec<Arc<RillNode>> = Vec::with_capacity(count);
    for i in 0..count {
        let node_config = RillNodeConfig {
            node_id: NodeId::from_data(format!("sim-node-{i}").as_bytes()),
            max_entry_bytes: config.storage.max_entry_bytes,
            sync,
            ..RillNodeConfig::default()
        };
        let node = Arc::new(RillNode::new(
            node_config,
            SigningKey::from_bytes(&random_seed()),
            Arc::new(MemoryStore::new(config.storage.memory_max_bytes)),
            ChainStore::in_memory(),
        )?);
        let handler: Weak<dyn MessageHandler> = Arc::downgrade(&node) as Weak<dyn MessageHandler>;
        node.set_transport(Arc::new(net.join(node.node_id(), handler)))?;
        nodes.push(node);
    }
    for node in &nodes {
        for other in &nodes {
            node.add_peer(other.node_id());
        }
    }

    net.drop_next(drop);
    let start = Instant::now();
    let writer = &nodes[0];
    let others: Vec<NodeId> = nodes[1..].iter().map(|n| n.node_id()).collect();
    let policy = ConvergencePolicy::from(&sync);

    let origin = writer
        .create_entry(TextEntry::new(SAMPLE_TEXT).to_bytes()?)
        .await?;
    let mut previous = origin;
    for i in 1..=updates {
        previous = writer
            .update_entry(UpdateEntryInput {
                original_hash: origin,
                previous_hash: previous,
                updated_content: TextEntry::new(format!("{SAMPLE_TEXT} (edit {i})")).to_bytes()?,
            })
            .await?;
    }
    writer.delete_entry(previous).await?;

    writer
        .await_convergence(&others, origin, policy)
        .await
        .context("nodes did not converge")?;
    let elapsed = start.elapsed();

    println!("Converged in {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    println!("  origin: {origin}");
    for node in &nodes {
        let Some(latest) = node.get_latest(origin).await? else {
            warn!(node = %node.node_id().short(), "node is missing the entry");
            continue;
        };
        let revisions = node.get_all_revisions(origin).await?.len();
        let oldest_delete = node.get_oldest_delete(origin).await?;
        println!(
            "  {} latest={} revisions={revisions} deleted={} text={:?}",
            node.node_id().short(),
            latest.hash().short(),
            oldest_delete.is_some(),
            latest.entry::<TextEntry>()?.content,
        );
    }

    let stats = net.stats();
    println!();
    println!(
        "Messages: {} delivered, {} dropped",
        stats.delivered, stats.dropped
    );
    Ok(())
}
