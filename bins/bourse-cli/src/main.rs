//! Bourse CLI
//!
//! Commands:
//! - `status`: Open/closed board for every exchange, or one exchange
//! - `next`: Which exchange opens next
//! - `schedules`: Dump the active schedule table as JSON
//! - `fetch`: GET a backend path through the response cache
//! - `ping`: Check the backend is reachable
//!
//! # Usage
//! ```bash
//! # Status board right now
//! bourse status
//!
//! # Is the JSE open at a given instant?
//! bourse status --exchange jse --at 2024-01-15T07:00:00Z
//!
//! # Next opening with a custom schedule file
//! bourse --schedule schedules.json next
//!
//! # Fetch twice; the second call is served from cache
//! BOURSE_API_URL=http://localhost:5000 bourse fetch --path /markets --repeat 2
//!
//! # Backend reachability
//! bourse ping --api-url http://localhost:5000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bourse_core::api::{ApiClient, ApiConfig};
use bourse_core::session::{MarketSessionEvaluator, ScheduleTable};
use bourse_core::NextOpening;

#[derive(Parser)]
#[command(name = "bourse")]
#[command(about = "African exchange sessions and cached backend fetches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// JSON schedule table to use instead of the built-in one
    #[arg(long, global = true)]
    schedule: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which exchanges are open
    Status {
        /// Only report this exchange id
        #[arg(long)]
        exchange: Option<String>,

        /// Reference time (RFC 3339, default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the next exchange to open
    Next {
        /// Reference time (RFC 3339, default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the active schedule table as JSON
    Schedules,

    /// GET a backend path (relative to /api) through the cache
    Fetch {
        /// Path under /api, e.g. /markets
        #[arg(long)]
        path: String,

        /// Backend base URL (overrides BOURSE_API_URL)
        #[arg(long)]
        api_url: Option<String>,

        /// Freshness window in milliseconds (overrides BOURSE_CACHE_MAX_AGE_MS)
        #[arg(long)]
        max_age_ms: Option<u64>,

        /// Number of times to fetch
        #[arg(long, default_value = "1")]
        repeat: u32,
    },

    /// Check that the backend answers
    Ping {
        /// Backend base URL (overrides BOURSE_API_URL)
        #[arg(long)]
        api_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    match cli.command {
        Commands::Status { exchange, at } => {
            let evaluator = load_evaluator(cli.schedule.as_ref())?;
            run_status(&evaluator, exchange, parse_asof(at.as_deref())?)
        }
        Commands::Next { at } => {
            let evaluator = load_evaluator(cli.schedule.as_ref())?;
            run_next(&evaluator, parse_asof(at.as_deref())?)
        }
        Commands::Schedules => {
            let evaluator = load_evaluator(cli.schedule.as_ref())?;
            println!("{}", serde_json::to_string_pretty(evaluator.table())?);
            Ok(())
        }
        Commands::Fetch { path, api_url, max_age_ms, repeat } => {
            run_fetch(path, api_url, max_age_ms, repeat).await
        }
        Commands::Ping { api_url } => run_ping(api_url).await,
    }
}

fn load_evaluator(schedule: Option<&PathBuf>) -> Result<MarketSessionEvaluator> {
    let table = match schedule {
        Some(path) => ScheduleTable::from_path(path)
            .with_context(|| format!("Failed to load schedule table {}", path.display()))?,
        None => ScheduleTable::builtin(),
    };
    Ok(MarketSessionEvaluator::new(table))
}

fn parse_asof(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --at time {:?}, expected RFC 3339", s))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn run_status(
    evaluator: &MarketSessionEvaluator,
    exchange: Option<String>,
    asof: DateTime<Utc>,
) -> Result<()> {
    info!("=== Exchange Status ===");
    info!("As of: {}", asof);

    if let Some(id) = exchange {
        if evaluator.schedule(&id).is_none() {
            warn!("Unknown exchange {:?}; reported as closed", id);
        }
        let is_open = evaluator.is_open(&id, asof);
        println!("{}: {}", id, if is_open { "OPEN" } else { "CLOSED" });
        return Ok(());
    }

    for status in evaluator.status_board(asof) {
        let detail = match (status.closes_in_minutes, status.opens_in_minutes) {
            (Some(m), _) => format!("closes in {}", format_minutes(m)),
            (None, Some(m)) => format!("opens in {}", format_minutes(m)),
            (None, None) => String::new(),
        };
        println!(
            "{:<6} {:<6} {:<42} {}",
            status.id,
            if status.is_open { "OPEN" } else { "CLOSED" },
            status.name,
            detail
        );
    }

    Ok(())
}

fn run_next(evaluator: &MarketSessionEvaluator, asof: DateTime<Utc>) -> Result<()> {
    let Some(next) = evaluator.next_opening(asof) else {
        anyhow::bail!("Schedule table is empty");
    };

    let when = match &next {
        NextOpening::LaterToday(_) => "later today",
        NextOpening::NextSession(_) => "next session",
        NextOpening::AfterWeekend(_) => "after the weekend",
    };

    println!(
        "{} opens {} at {} (in {})",
        next.exchange_id(),
        when,
        next.opens_at().format("%a %Y-%m-%d %H:%M UTC"),
        format_minutes((next.opens_at() - asof).num_minutes())
    );

    Ok(())
}

fn load_config(api_url: Option<String>) -> Result<ApiConfig> {
    let config = ApiConfig::from_env()?;
    match api_url {
        Some(url) => config.with_base_url(&url),
        None => Ok(config),
    }
}

async fn run_ping(api_url: Option<String>) -> Result<()> {
    let config = load_config(api_url)?;

    info!("=== Connectivity ===");
    info!("Base URL: {}", config.base_url);

    let client = ApiClient::new(&config)?;
    client.test_connectivity().await?;
    println!("{}: reachable", client.base_url());
    Ok(())
}

async fn run_fetch(
    path: String,
    api_url: Option<String>,
    max_age_ms: Option<u64>,
    repeat: u32,
) -> Result<()> {
    let mut config = load_config(api_url)?;
    if let Some(ms) = max_age_ms {
        config.max_age = Duration::from_millis(ms);
    }

    info!("=== Cached Fetch ===");
    info!("Base URL: {}", config.base_url);
    info!("Max age: {:?}", config.max_age);

    let client = ApiClient::new(&config)?;
    client.start_sweeper();

    let mut last = None;
    for i in 0..repeat.max(1) {
        let value = client.get_json(&path).await?;
        info!("[{}] GET {} ok", i, client.url(&path));
        last = Some(value);
    }

    if let Some(value) = last {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    let stats = client.stats();
    info!("");
    info!("=== Cache Summary ===");
    info!("Entries: {}", stats.entries);
    info!("Hits: {}", stats.hits);
    info!("Misses: {}", stats.misses);
    info!("Stores: {}", stats.stores);

    client.cache().dispose();
    Ok(())
}

fn format_minutes(minutes: i64) -> String {
    let days = minutes / 1440;
    let hours = (minutes % 1440) / 60;
    let mins = minutes % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, mins)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(5), "5m");
        assert_eq!(format_minutes(75), "1h 15m");
        assert_eq!(format_minutes(1440 + 61), "1d 1h 1m");
    }

    #[test]
    fn test_ping_command_parses() {
        let cli = Cli::try_parse_from(["bourse", "ping", "--api-url", "http://10.0.0.5:5000"]).unwrap();
        match cli.command {
            Commands::Ping { api_url } => assert_eq!(api_url.as_deref(), Some("http://10.0.0.5:5000")),
            _ => panic!("expected ping"),
        }
    }

    #[test]
    fn test_load_config_rejects_bad_url() {
        assert!(load_config(Some("ftp://example.com".to_string())).is_err());
        let config = load_config(Some("http://example.com:8080".to_string())).unwrap();
        assert_eq!(config.base_url, "http://example.com:8080");
    }

    #[test]
    fn test_parse_asof() {
        let at = parse_asof(Some("2024-01-15T09:00:00+02:00")).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-15T07:00:00+00:00");
        assert!(parse_asof(Some("monday")).is_err());
    }
}
