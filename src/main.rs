//! Channel-Graph main entry point
//!
//! This is the command-line interface for the Channel-Graph crawler.

use anyhow::{bail, Context};
use channel_graph::config::{load_config_with_hash, Config};
use channel_graph::crawler::{collect_jobs, import_discovery, resolve_categories, run_crawl};
use channel_graph::graph::{GraphExporter, GraphSnapshot};
use channel_graph::storage::SqliteStorage;
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Channel-Graph: a channel relationship crawler
///
/// Channel-Graph resolves discovered channels through a pool of protocol
/// sessions, records their similar and reposted-from channels, and exports
/// the resulting graph to Neo4j.
#[derive(Parser, Debug)]
#[command(name = "channel-graph")]
#[command(version = "1.0.0")]
#[command(about = "A channel relationship crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a new run instead of resuming an interrupted one
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "import", "export_graph"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "import", "export_graph"])]
    stats: bool,

    /// Import a discovery document ({"category": ["url", ...]}) and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "export_graph"])]
    import: Option<PathBuf>,

    /// Export channels and edges to the configured graph store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "import"])]
    export_graph: bool,

    /// Delete everything in the graph store before exporting
    #[arg(long, requires = "export_graph")]
    clear_graph: bool,

    /// Only crawl these categories (repeatable)
    #[arg(long = "category", value_name = "NAME")]
    categories: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli.categories)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.import {
        handle_import(&config, path)?;
    } else if cli.export_graph {
        handle_export_graph(&config, cli.clear_graph).await?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh, &cli.categories).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("channel_graph=info,warn"),
            1 => EnvFilter::new("channel_graph=debug,info"),
            2 => EnvFilter::new("channel_graph=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    SqliteStorage::new(path).with_context(|| format!("opening database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, categories: &[String]) -> anyhow::Result<()> {
    println!("=== Channel-Graph Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Dequeue timeout: {}ms", config.crawler.dequeue_timeout_ms);
    println!(
        "  Backoff: {}ms x min(2n, {})",
        config.crawler.backoff_unit_ms, config.crawler.max_backoff_units
    );

    println!("\nSessions:");
    println!("  Directory: {}", config.sessions.directory);
    println!(
        "  Connect failure limit: {}",
        config.sessions.connect_failure_limit
    );

    println!("\nGateway: {}", config.gateway.base_url);
    match &config.proxy {
        Some(proxy) => println!(
            "Proxies: {} static, list {}",
            proxy.static_proxies.len(),
            proxy.list_url.as_deref().unwrap_or("(none)")
        ),
        None => println!("Proxies: none (direct connections)"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let storage = open_database(config)?;
    let categories = resolve_categories(config, &storage, categories)?;
    let jobs = collect_jobs(&storage, &categories, &HashSet::new())?;

    println!("\nCategories ({}):", categories.len());
    for category in &categories {
        let count = jobs
            .iter()
            .filter(|j| j.category.as_deref() == Some(category.as_str()))
            .count();
        println!("  - {} ({} channels)", category, count);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} channels", jobs.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use channel_graph::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --import mode: loads a discovery document into the category tables
fn handle_import(config: &Config, path: &Path) -> anyhow::Result<()> {
    let mut storage = open_database(config)?;
    let report = import_discovery(&mut storage, path)
        .with_context(|| format!("importing {}", path.display()))?;

    println!(
        "✓ Imported {} addresses in {} categories ({} skipped)",
        report.linked, report.categories, report.skipped
    );
    Ok(())
}

/// Handles the --export-graph mode: writes the stored graph to Neo4j
async fn handle_export_graph(config: &Config, clear: bool) -> anyhow::Result<()> {
    let Some(graph_config) = &config.graph else {
        bail!("--export-graph needs a [graph] section in the configuration");
    };

    let snapshot = {
        let storage = open_database(config)?;
        GraphSnapshot::from_storage(&storage)?
    };
    tracing::info!(
        "Loaded {} channels, {} similar and {} repost edges",
        snapshot.nodes.len(),
        snapshot.similar.len(),
        snapshot.reposts.len()
    );

    let exporter = GraphExporter::connect(graph_config).await?;
    if clear {
        exporter.clear().await?;
    }
    let report = exporter.export(&snapshot).await?;

    println!(
        "✓ Exported {} channels, {} similar and {} repost relationships",
        report.nodes, report.similar, report.reposts
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    categories: &[String],
) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring interrupted runs)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }

    match run_crawl(config, config_hash, fresh, categories).await {
        Ok(summary) => {
            tracing::info!(
                "Crawl finished: {} done, {} unresolvable, {} failed, {} deferred",
                summary.done,
                summary.unresolvable,
                summary.failed,
                summary.deferred
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
