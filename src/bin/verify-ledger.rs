use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info};

use audit_ledger::api::parse_date_param;
use audit_ledger::audit::{ChainVerifier, DateRange, VerificationReport};
use audit_ledger::database::queries::Queries;
use audit_ledger::database::Database;

/// Verify audit ledger hash chain integrity
#[derive(Parser, Debug)]
#[command(name = "verify-ledger", version)]
struct Args {
    /// Ledger database URL
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite://audit-ledger.db")]
    database_url: String,

    /// Only verify entries created at or after this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Only verify entries created at or before this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    /// List every entry, not just failures
    #[arg(short, long)]
    verbose: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Suppress output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        tracing::Level::ERROR
    } else if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let range = build_range(&args)?;
    info!("Verifying audit ledger: {}", args.database_url);
    let database = Database::open_existing(&args.database_url)
        .await
        .map_err(|e| anyhow!("Cannot open audit ledger {}: {}", args.database_url, e))?;

    let report = ChainVerifier::new(database.clone()).verify(range).await?;
    if range.is_none() && report.total_entries == 0 {
        database.close().await;
        return Err(anyhow!("Audit ledger is empty"));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !args.quiet {
        print_report(&report, args.verbose);
        if args.verbose {
            if let Some(latest) = Queries::latest_entry(database.pool()).await? {
                println!("Chain head: {}", latest.into_entry()?.summary());
            }
        }
        let stats = Queries::stats(database.pool()).await?;
        if let (Some(first), Some(last)) = (stats.first_entry_at, stats.last_entry_at) {
            println!("Ledger spans {} .. {} ({} entries)", first, last, stats.total_entries);
        }
    }

    database.close().await;

    if !report.is_chain_valid {
        error!("{}", report.summary());
        std::process::exit(1);
    }
    Ok(())
}

fn build_range(args: &Args) -> Result<Option<DateRange>> {
    let start = args
        .start
        .as_deref()
        .map(|v| parse_date_param("start", v))
        .transpose()?;
    let end = args
        .end
        .as_deref()
        .map(|v| parse_date_param("end", v))
        .transpose()?;

    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    DateRange::new(start, end)
        .map(Some)
        .map_err(|e| anyhow!("Invalid range: {}", e))
}

fn print_report(report: &VerificationReport, verbose: bool) {
    for result in &report.results {
        if !verbose && result.is_valid {
            continue;
        }
        let status = if result.is_valid { "ok" } else { "INVALID" };
        println!(
            "  #{:<8} {:<32} {}  link:{} hash:{}",
            result.entry_id,
            result.event_type,
            status,
            if result.previous_hash_valid { "ok" } else { "broken" },
            if result.hash_valid { "ok" } else { "mismatch" }
        );
    }

    if !report.seed_hash.is_empty() {
        println!("Window seeded from hash {}", report.seed_hash);
    }
    println!("{}", report.summary());
}
