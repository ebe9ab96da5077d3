use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use pocket_core::logging::{LoggingConfig as LogSettings, init_logging};
use pocket_core::{Config, Record, SearchMode};
use pocket_search::{CacheManagerStats, CacheScope, PocketContext, SearchQuery, SearchResult};
use pocket_store::PoolStats;
use serde::Serialize;
use std::path::PathBuf;

/// Pocket - personal text records with hybrid search
#[derive(Parser, Debug)]
#[command(name = "pocket")]
#[command(about = "Store short text records and find them again with hybrid search", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to pocket.toml (default: ~/.pocket/pocket.toml if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file, overriding [store].path
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a record
    Add {
        #[arg(required = true, value_name = "TEXT")]
        text: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Search records
    Search {
        #[arg(value_name = "TEXT", default_value = "")]
        text: String,

        /// Only records carrying all of these tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// substr, fts, glob, regex, exact, vector, fuzzy or hybrid (default from config)
        #[arg(short, long)]
        mode: Option<SearchMode>,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed records that have no current embedding
    Embed {
        /// Records per batch (default from config)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Show store, pool and cache statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Clear caches: all, embeddings, search_results or index
    ClearCache {
        #[arg(value_name = "SCOPE", default_value = "all")]
        scope: CacheScope,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[derive(Serialize)]
struct StatsReport {
    records: u64,
    full_text: bool,
    pool: PoolStats,
    caches: CacheManagerStats,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        report_error(&e);
        std::process::exit(1);
    }
}

/// Pool exhaustion and store failures print as operational errors, never as empty results
fn report_error(e: &anyhow::Error) {
    let operational = e.chain().any(|cause| {
        cause.downcast_ref::<pocket_search::Error>().is_some_and(pocket_search::Error::is_operational)
            || cause.downcast_ref::<pocket_store::Error>().is_some_and(pocket_store::Error::is_operational)
    });

    if operational {
        eprintln!("{} {:#}", "Store unavailable:".red().bold(), e);
    } else {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::ExampleConfig) {
        print!("{}", Config::example());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = cli.db {
        config.store.path = db;
    }

    let _log_guard = init_logging(Some(LogSettings::from(config.logging.clone()))).context("Failed to initialize logging")?;

    if cli.verbose {
        println!("{} Store: {}", "Info:".blue().bold(), config.store.path.display());
    }

    let context = PocketContext::open(config).await.context("Failed to open pocket")?;
    let outcome = dispatch(&context, cli.command, cli.verbose).await;
    context.shutdown().await;
    outcome
}

async fn dispatch(context: &PocketContext, command: Commands, verbose: bool) -> Result<()> {
    match command {
        Commands::Add { text, tags } => cmd_add(context, text, tags).await,
        Commands::Search { text, tags, mode, limit, json } => {
            let mode = mode.unwrap_or(context.config.search.default_mode);
            cmd_search(context, SearchQuery::new(text).with_tags(tags).with_mode(mode).with_limit(limit), json, verbose)
                .await
        }
        Commands::Embed { batch_size } => cmd_embed(context, batch_size).await,
        Commands::Stats { json } => cmd_stats(context, json).await,
        Commands::ClearCache { scope } => {
            context.engine.clear_cache(scope).await;
            println!("{} Cleared {} cache", "Success:".green().bold(), scope);
            Ok(())
        }
        Commands::ExampleConfig => Ok(()),
    }
}

async fn cmd_add(context: &PocketContext, text: String, tags: Vec<String>) -> Result<()> {
    anyhow::ensure!(!text.trim().is_empty(), "Record text must not be empty");

    let record = Record::new(text, tags);
    context.store.insert(&record).await.context("Failed to add record")?;
    context.engine.clear_cache(CacheScope::SearchResults).await;

    println!("{} {}", "Added".green().bold(), record.id.cyan());
    Ok(())
}

async fn cmd_search(context: &PocketContext, query: SearchQuery, json: bool, verbose: bool) -> Result<()> {
    let results = context.engine.search(&context.store, &query).await.context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", "No matches".yellow());
        return Ok(());
    }

    for result in &results {
        print_result(result, verbose);
    }
    Ok(())
}

fn print_result(result: &SearchResult, verbose: bool) {
    let record = &result.record;
    println!(
        "{} {} {}",
        format!("{:.3}", result.total_score).green().bold(),
        record.id.cyan(),
        record.created.format("%Y-%m-%d %H:%M").dimmed()
    );
    if !record.tags.is_empty() {
        println!("  {}", record.tags.join(", ").blue());
    }
    println!("  {}", record.text);
    if verbose {
        for reason in &result.match_reasons {
            println!("  {}", reason.dimmed());
        }
    }
}

async fn cmd_embed(context: &PocketContext, batch_size: Option<usize>) -> Result<()> {
    let batch_size = batch_size.unwrap_or(context.config.search.embedding_batch_size);
    let report = context
        .engine
        .backfill_embeddings(&context.store, batch_size)
        .await
        .context("Embedding backfill failed")?;

    println!(
        "{} embedded {} of {} pending records in {} batches",
        "Success:".green().bold(),
        report.embedded,
        report.pending,
        report.batches
    );
    if report.skipped > 0 {
        println!("{} {} records could not be embedded", "Warning:".yellow().bold(), report.skipped);
    }
    Ok(())
}

async fn cmd_stats(context: &PocketContext, json: bool) -> Result<()> {
    let report = StatsReport {
        records: context.store.count().await.context("Failed to count records")?,
        full_text: context.store.fts_available(),
        pool: context.store.pool_stats(),
        caches: context.engine.cache_stats().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Store".bold());
    println!("  records:    {}", report.records);
    println!("  full text:  {}", if report.full_text { "fts5" } else { "substring fallback" });
    println!("{}", "Pool".bold());
    println!(
        "  connections: {} total, {} in use, {} idle (max {})",
        report.pool.total, report.pool.in_use, report.pool.idle, report.pool.max_connections
    );
    println!(
        "  lifetime:    {} created, {} closed, {} failed",
        report.pool.created, report.pool.closed, report.pool.failed
    );
    println!("{}", "Caches".bold());
    let embeddings = &report.caches.embeddings;
    println!("  embeddings: {}/{} in memory", embeddings.memory.size, embeddings.memory.max_size);
    if let (Some(entries), Some(bytes)) = (embeddings.disk_entries, embeddings.disk_bytes) {
        println!("  embeddings: {entries} on disk ({bytes} bytes)");
    }
    println!("  results:    {}/{}", report.caches.results.size, report.caches.results.max_size);
    println!("  index:      {}/{}", report.caches.index.size, report.caches.index.max_size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    async fn open_context(temp_dir: &TempDir) -> PocketContext {
        let mut config = Config::default();
        config.store.path = temp_dir.path().join("pocket.db");
        config.pool.min_connections = 1;
        PocketContext::open(config).await.unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["pocket", "stats"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.db.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_add_command() {
        let cli = Cli::try_parse_from(["pocket", "add", "remember the milk", "--tags", "Home,errands"]).unwrap();
        if let Commands::Add { text, tags } = cli.command {
            assert_eq!(text, "remember the milk");
            assert_eq!(tags, vec!["Home", "errands"]);
        } else {
            panic!("Expected Add command");
        }
    }

    #[test]
    fn test_cli_search_command() {
        let cli = Cli::try_parse_from(["pocket", "search", "milk", "--mode", "fuzzy", "-l", "3", "--json"]).unwrap();
        if let Commands::Search { text, mode, limit, json, tags } = cli.command {
            assert_eq!(text, "milk");
            assert_eq!(mode, Some(SearchMode::Fuzzy));
            assert_eq!(limit, 3);
            assert!(json);
            assert!(tags.is_empty());
        } else {
            panic!("Expected Search command");
        }

        assert!(Cli::try_parse_from(["pocket", "search", "milk", "--mode", "telepathy"]).is_err());
    }

    #[test]
    fn test_cli_clear_cache_scope() {
        let cli = Cli::try_parse_from(["pocket", "clear-cache"]).unwrap();
        assert!(matches!(cli.command, Commands::ClearCache { scope: CacheScope::All }));

        let cli = Cli::try_parse_from(["pocket", "clear-cache", "search_results"]).unwrap();
        assert!(matches!(cli.command, Commands::ClearCache { scope: CacheScope::SearchResults }));

        assert!(Cli::try_parse_from(["pocket", "clear-cache", "everything"]).is_err());
    }

    #[test]
    fn test_report_error_detects_operational() {
        let err = anyhow::Error::new(pocket_store::Error::unavailable("disk gone")).context("Search failed");
        assert!(err.chain().any(|cause| {
            cause.downcast_ref::<pocket_store::Error>().is_some_and(pocket_store::Error::is_operational)
        }));
        report_error(&err);
    }

    #[tokio::test]
    async fn test_add_then_search() {
        let temp_dir = TempDir::new().unwrap();
        let context = open_context(&temp_dir).await;

        cmd_add(&context, "remember the milk".to_string(), vec!["home".to_string()]).await.unwrap();
        assert_eq!(context.store.count().await.unwrap(), 1);

        let query = SearchQuery::new("milk").with_mode(SearchMode::Substr);
        let results = context.engine.search(&context.store, &query).await.unwrap();
        assert_eq!(results.len(), 1);

        cmd_search(&context, query, false, true).await.unwrap();
        cmd_embed(&context, Some(4)).await.unwrap();
        cmd_stats(&context, true).await.unwrap();

        context.shutdown().await;
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_add_rejects_empty_text() {
        let temp_dir = TempDir::new().unwrap();
        let context = open_context(&temp_dir).await;

        assert!(cmd_add(&context, "   ".to_string(), Vec::new()).await.is_err());

        context.shutdown().await;
        let _ = temp_dir;
    }
}
