// Entry point for the marketing-metrics sync CLI

mod config;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use etl::{run, Extractor, PostgresStore, RunConfig, RunReport, SyncWindow};
use meta_graph::MetaClient;
use rdstation::RdStationClient;

#[derive(Parser)]
#[command(name = "sync", about = "Sync marketing metrics into the warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Explicit window start (YYYY-MM-DD); requires --until
    #[arg(long, global = true)]
    since: Option<NaiveDate>,

    /// Explicit window end (YYYY-MM-DD); requires --since
    #[arg(long, global = true)]
    until: Option<NaiveDate>,

    /// Window reach for an integration with no watermark yet
    #[arg(long, global = true, default_value_t = 30)]
    lookback_days: i64,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Sync Meta ad insights, creatives, campaigns, and insights
    Meta,
    /// Sync RD Station contacts, campaigns, and conversions
    Rdstation,
    /// Run every configured integration
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let window = explicit_window(&cli)?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = PostgresStore::new(pool);

    let integrations: &[&str] = match cli.command {
        Command::Meta => &["meta"],
        Command::Rdstation => &["rdstation"],
        Command::All => &["meta", "rdstation"],
    };

    let mut failed = false;
    for integration in integrations {
        match run_integration(integration, &config, &store, window, cli.lookback_days).await {
            Ok(report) => print_report(&report),
            Err(err) => {
                tracing::error!(integration = %integration, error = %err, "sync failed");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_integration(
    integration: &str,
    config: &Config,
    store: &PostgresStore,
    window: Option<SyncWindow>,
    lookback_days: i64,
) -> Result<RunReport> {
    let extractors: Vec<Box<dyn Extractor>> = match integration {
        "meta" => MetaClient::new(config.meta()?).extractors(),
        "rdstation" => RdStationClient::new(config.rdstation()?).extractors(),
        other => bail!("unknown integration: {other}"),
    };

    let mut run_config = RunConfig::new(integration)
        .with_lookback(Duration::days(lookback_days))
        .with_concurrency(config.concurrency);
    if let Some(window) = window {
        run_config = run_config.with_window(window);
    }

    let report = run(&extractors, store, &run_config).await?;
    Ok(report)
}

/// Turn `--since`/`--until` into a window override. Both or neither.
fn explicit_window(cli: &Cli) -> Result<Option<SyncWindow>> {
    match (cli.since, cli.until) {
        (Some(since), Some(until)) => {
            if since >= until {
                bail!("--since must be before --until");
            }
            Ok(Some(SyncWindow::new(
                since.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc(),
                until.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc(),
            )))
        }
        (None, None) => Ok(None),
        _ => bail!("--since and --until must be given together"),
    }
}

fn print_report(report: &RunReport) {
    println!(
        "{}: {} records fetched, {} rows loaded ({} .. {})",
        report.integration,
        report.total_fetched(),
        report.total_loaded(),
        report.window.since_date(),
        report.window.until_date(),
    );
    for resource in &report.resources {
        println!(
            "  {:<28} fetched {:>7}  loaded {:>7}",
            resource.table, resource.fetched, resource.loaded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("sync").chain(args.iter().copied()))
    }

    #[test]
    fn test_window_requires_both_bounds() {
        assert!(explicit_window(&cli(&["meta", "--since", "2024-03-01"])).is_err());
        assert!(explicit_window(&cli(&["meta"])).unwrap().is_none());
    }

    #[test]
    fn test_window_bounds_must_be_ordered() {
        let result = explicit_window(&cli(&[
            "meta",
            "--since",
            "2024-03-31",
            "--until",
            "2024-03-01",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_window_parses_dates() {
        let window = explicit_window(&cli(&[
            "all",
            "--since",
            "2024-03-01",
            "--until",
            "2024-03-31",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(window.since_date(), "2024-03-01");
        assert_eq!(window.until_date(), "2024-03-31");
    }
}
