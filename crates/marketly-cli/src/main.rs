//! marketly: query the aggregation layer from the command line.
//!
//! Usage:
//!   marketly financials AAPL [--refresh]
//!   marketly news AAPL,MSFT [--days 7] [--max 50] [--grouped|--mixed]
//!   marketly macro [--years 20]
//!   marketly score AAPL
//!   marketly invalidate AAPL
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr.

use aggregation_orchestrator::{
    AggregationOrchestrator, MarketlyConfig, DEFAULT_GROUPED_DAYS, DEFAULT_GROUPED_MAX_ITEMS,
    DEFAULT_MACRO_YEARS, DEFAULT_MIXED_DAYS, DEFAULT_MIXED_MAX_ITEMS, DEFAULT_NEWS_DAYS,
    DEFAULT_NEWS_MAX_ITEMS,
};
use anyhow::{bail, Context, Result};
use cache_manager::{CacheManager, CacheStore, MemoryStore, RedisStore};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewsMode {
    Single,
    Grouped,
    Mixed,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Financials { symbol: String, refresh: bool },
    News { symbols: String, days: Option<u32>, max_items: Option<usize>, mode: NewsMode },
    Macro { years: u32 },
    Score { symbol: String },
    Invalidate { symbol: String },
}

fn flag_value<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args.iter().position(|a| a == flag) {
        Some(i) => {
            let raw = args.get(i + 1).with_context(|| format!("{} needs a value", flag))?;
            let value = raw.parse().with_context(|| format!("invalid value for {}: {}", flag, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn positional(args: &[String], what: &str) -> Result<String> {
    args.get(1)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .with_context(|| format!("missing {}", what))
}

/// `args` excludes the program name
fn parse_command(args: &[String]) -> Result<Command> {
    let has = |flag: &str| args.iter().any(|a| a == flag);

    let command = match args.first().map(String::as_str) {
        Some("financials") => Command::Financials {
            symbol: positional(args, "SYMBOL")?,
            refresh: has("--refresh"),
        },
        Some("news") => {
            let mode = match (has("--grouped"), has("--mixed")) {
                (true, true) => bail!("--grouped and --mixed are mutually exclusive"),
                (true, false) => NewsMode::Grouped,
                (false, true) => NewsMode::Mixed,
                (false, false) => NewsMode::Single,
            };
            Command::News {
                symbols: positional(args, "SYMBOLS")?,
                days: flag_value(args, "--days")?,
                max_items: flag_value(args, "--max")?,
                mode,
            }
        }
        Some("macro") => Command::Macro {
            years: flag_value(args, "--years")?.unwrap_or(DEFAULT_MACRO_YEARS),
        },
        Some("score") => Command::Score {
            symbol: positional(args, "SYMBOL")?,
        },
        Some("invalidate") => Command::Invalidate {
            symbol: positional(args, "SYMBOL")?,
        },
        Some(other) => bail!("unknown command: {}", other),
        None => bail!("no command given"),
    };
    Ok(command)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  marketly financials SYMBOL [--refresh]        Merged financial record");
    eprintln!("  marketly news SYMBOLS [--days N] [--max N]     Company news (comma-separated symbols)");
    eprintln!("               [--grouped|--mixed]");
    eprintln!("  marketly macro [--years N]                    Month-end macro indicators (default: {})", DEFAULT_MACRO_YEARS);
    eprintln!("  marketly score SYMBOL                         Score a company with the configured scorer");
    eprintln!("  marketly invalidate SYMBOL                    Drop cached record and news for a symbol");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "marketly=info,aggregation_orchestrator=info,cache_manager=warn".into())
    };

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Redis when configured and reachable, otherwise the in-process store
async fn connect_store(config: &MarketlyConfig) -> Arc<dyn CacheStore> {
    match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                tracing::info!("Connected to Redis cache");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-memory cache", e);
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, using in-memory cache");
            Arc::new(MemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {:#}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    let config = MarketlyConfig::from_env()?;
    let store = connect_store(&config).await;
    let cache = Arc::new(CacheManager::new(store, config.cache_prefix.clone(), config.ttl_policy()));
    let orchestrator = AggregationOrchestrator::from_config(&config, cache)?;

    match command {
        Command::Financials { symbol, refresh } => {
            let record = orchestrator.get_financial_record(&symbol, refresh).await;
            if record.is_empty() {
                tracing::warn!("No source returned data for {}", record.symbol);
            }
            print_json(&record)?;
        }
        Command::News { symbols, days, max_items, mode } => match mode {
            NewsMode::Single => {
                let news = orchestrator
                    .get_news(
                        &symbols,
                        days.unwrap_or(DEFAULT_NEWS_DAYS),
                        max_items.unwrap_or(DEFAULT_NEWS_MAX_ITEMS),
                    )
                    .await;
                print_json(&news)?;
            }
            NewsMode::Grouped => {
                let news = orchestrator
                    .get_news_grouped(
                        &symbols,
                        days.unwrap_or(DEFAULT_GROUPED_DAYS),
                        max_items.unwrap_or(DEFAULT_GROUPED_MAX_ITEMS),
                    )
                    .await;
                print_json(&news)?;
            }
            NewsMode::Mixed => {
                let news = orchestrator
                    .get_news_mixed(
                        &symbols,
                        days.unwrap_or(DEFAULT_MIXED_DAYS),
                        max_items.unwrap_or(DEFAULT_MIXED_MAX_ITEMS),
                    )
                    .await;
                print_json(&news)?;
            }
        },
        Command::Macro { years } => {
            print_json(&orchestrator.get_macro_snapshot(years).await)?;
        }
        Command::Score { symbol } => {
            let result = orchestrator.score_symbol(&symbol).await?;
            print_json(&result)?;
        }
        Command::Invalidate { symbol } => {
            let removed = orchestrator.invalidate_symbol(&symbol).await;
            print_json(&serde_json::json!({ "symbol": symbol, "removed": removed }))?;
        }
    }

    tracing::debug!("Cache stats: {:?}", orchestrator.cache_stats());
    Ok(())
}
