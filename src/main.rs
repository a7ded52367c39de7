//! Minutely CLI
//!
//! Inspect and repair a bucket store:
//! - Look up a single minute, a range, or the bucket before an instant
//! - Record a minute's count, chaining the running total from the previous bucket
//! - Prune old buckets
//! - Generate a default config file

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use minutely::{
    generate_default_config, logging, open_store, Bucket, BucketStore, Config, DeletionQuery,
    StoreError,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minutely")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Minute-granularity event counter store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the bucket for the minute containing TIME
    Get {
        #[arg(value_parser = parse_time)]
        time: DateTime<Utc>,
    },

    /// List buckets in [START, END)
    Range {
        #[arg(value_parser = parse_time)]
        start: DateTime<Utc>,
        #[arg(value_parser = parse_time)]
        end: DateTime<Utc>,
    },

    /// Show the latest bucket before the minute containing TIME
    Previous {
        #[arg(value_parser = parse_time)]
        time: DateTime<Utc>,
    },

    /// Record COUNT events for the minute containing TIME
    Record {
        #[arg(value_parser = parse_time)]
        time: DateTime<Utc>,
        count: i64,
    },

    /// Delete buckets older than a cutoff
    Prune {
        #[arg(long, value_parser = parse_time)]
        before: DateTime<Utc>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse "now" or an RFC 3339 timestamp
fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if s.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Wrote default config to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };

    logging::init(&config.logging)?;
    tracing::debug!("Storage config: {:?}", config.storage);

    let store = open_store(&config.storage).context("opening bucket store")?;

    match cli.command {
        Commands::Get { time } => match store.get_exact(time).await? {
            Some(bucket) => print_buckets(cli.format, &[bucket])?,
            None => {
                eprintln!("No bucket at {}", BucketStore::derive_key(time)?);
                std::process::exit(1);
            }
        },

        Commands::Range { start, end } => {
            let buckets = store.get_range(start, end).await?;
            print_buckets(cli.format, &buckets)?;
        }

        Commands::Previous { time } => match store.get_previous_bucket(time).await {
            Ok(bucket) => print_buckets(cli.format, &[bucket])?,
            Err(StoreError::NoPreviousBucket(minute)) => {
                eprintln!("No bucket before {}", minute);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Record { time, count } => {
            let bucket = record(&store, time, count).await?;
            print_buckets(cli.format, &[bucket])?;
        }

        Commands::Prune { before } => {
            let removed = store
                .delete_matching(&DeletionQuery::older_than(before))
                .await?;
            println!("Deleted {} buckets older than {}", removed, before);
        }

        Commands::Config { .. } => unreachable!("handled before opening the store"),
    }

    Ok(())
}

/// Create or update the minute at `time`, chaining the running total
async fn record(store: &BucketStore, time: DateTime<Utc>, count: i64) -> anyhow::Result<Bucket> {
    let total_count = match store.get_previous_bucket(time).await {
        Ok(previous) => chain_total(previous.total_count(), count)?,
        Err(StoreError::NoPreviousBucket(_)) => count,
        Err(e) => return Err(e.into()),
    };

    let bucket = if store.exists(time).await? {
        store.set_count(time, count, total_count).await?
    } else {
        store.create(Bucket::new(time, count, total_count)?).await?
    };

    Ok(bucket)
}

/// Running total for a minute following a bucket with `previous_total`
fn chain_total(previous_total: i64, count: i64) -> Result<i64, StoreError> {
    previous_total.checked_add(count).ok_or_else(|| {
        StoreError::InvalidArgument(format!(
            "total_count overflows: {} + {}",
            previous_total, count
        ))
    })
}

fn print_buckets(format: OutputFormat, buckets: &[Bucket]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(buckets)?);
        }
        OutputFormat::Table => {
            if buckets.is_empty() {
                println!("No buckets.");
                return Ok(());
            }

            println!("{:<22} {:>10} {:>12}", "Minute", "Count", "Total");
            println!("{}", "-".repeat(46));
            for bucket in buckets {
                println!(
                    "{:<22} {:>10} {:>12}",
                    bucket.key(),
                    bucket.count(),
                    bucket.total_count()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chain_total() {
        assert_eq!(chain_total(8, 5).unwrap(), 13);
        assert!(matches!(
            chain_total(i64::MAX, 1),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_record_chains_from_previous_bucket() {
        let store = BucketStore::in_memory();
        let at = |m| Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap();

        let first = record(&store, at(0), 3).await.unwrap();
        assert_eq!(first.total_count(), 3);

        let second = record(&store, at(2), 5).await.unwrap();
        assert_eq!(second.total_count(), 8);

        // Re-recording a minute updates it in place
        let again = record(&store, at(2), 6).await.unwrap();
        assert_eq!(again.total_count(), 9);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_rejects_overflowing_total() {
        let store = BucketStore::in_memory();
        let at = |m| Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap();
        store
            .create(Bucket::new(at(0), 1, i64::MAX).unwrap())
            .await
            .unwrap();

        let err = record(&store, at(1), 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidArgument(_))
        ));
        assert!(!store.exists(at(1)).await.unwrap());
    }
}
