mod config;
mod db;
mod enrich;
mod errors;
mod ingest;
mod paper;
mod redif;
mod sanitize;
mod transport;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::db::ListingStatus;
use crate::ingest::Ingestor;
use crate::transport::NetTransport;

#[derive(Parser)]
#[command(name = "redif_ingest", about = "RePEc ReDIF metadata harvester")]
struct Cli {
    /// SQLite database path (overrides configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and optionally seed listings and JEL codes
    Init {
        /// File with one listing URL per line
        #[arg(long)]
        listings: Option<PathBuf>,
        /// Tab-separated JEL codes: code, parent, description
        #[arg(long)]
        jel: Option<PathBuf>,
    },
    /// Download, parse and store listings
    Update {
        /// Which listings to process
        #[arg(long, value_enum, default_value = "pending")]
        status: ListingStatus,
        /// Per-document timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Documents per transaction
        #[arg(long)]
        batch_size: Option<usize>,
        /// Concurrent FTP downloads
        #[arg(long)]
        ftp_workers: Option<usize>,
        /// Concurrent HTTP downloads
        #[arg(long)]
        http_workers: Option<usize>,
    },
    /// Rebuild papers from stored templates without downloading
    Reprocess {
        /// Max papers to rebuild (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print the stored ReDIF template of a paper
    Show {
        /// Paper handle, e.g. RePEc:cpb:wpaper:2018-11
        handle: String,
    },
    /// Show listing and paper counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(database) = cli.database {
        settings.database = database;
    }
    let conn = open(&settings.database)?;

    match cli.command {
        Commands::Init { listings, jel } => {
            if let Some(path) = jel {
                let codes = read_jel(&path)?;
                let n = db::insert_jel(&conn, &codes)?;
                println!("Loaded {} JEL codes", n);
            }
            if let Some(path) = listings {
                let urls = read_lines(&path)?;
                let inserted = db::insert_listings(&conn, &urls)?;
                println!("Inserted {} new listings ({} in file)", inserted, urls.len());
            }
            println!("Database ready at {}", settings.database.display());
        }
        Commands::Update {
            status,
            timeout,
            batch_size,
            ftp_workers,
            http_workers,
        } => {
            settings.timeout_secs = timeout.unwrap_or(settings.timeout_secs);
            settings.batch_size = batch_size.unwrap_or(settings.batch_size);
            settings.ftp_workers = ftp_workers.unwrap_or(settings.ftp_workers);
            settings.http_workers = http_workers.unwrap_or(settings.http_workers);
            settings.validate()?;

            let transport = NetTransport::new(settings.timeout())?;
            let stats = Ingestor::new(&settings, transport)
                .run(&conn, status)
                .await
                .context("Update failed")?;
            println!(
                "All batches: {} out of {} records updated successfully",
                stats.ok(),
                stats.total()
            );
        }
        Commands::Reprocess { limit } => {
            let tally = ingest::reprocess(&conn, limit)?;
            println!("Rebuilt {} of {} stored papers", tally.ok, tally.total);
        }
        Commands::Show { handle } => match db::fetch_stored_template(&conn, &handle)? {
            Some(blob) => print!("{}", paper::decompress(&blob)?.to_redif()),
            None => println!("No paper with handle {}", handle),
        },
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Listings:  {}", s.listings);
            println!("  ok:      {}", s.ok);
            println!("  pending: {}", s.pending);
            println!("  error:   {}", s.errors);
            println!("Papers:    {}", s.papers);
            println!("Authors:   {}", s.authors);
            println!("JEL links: {}", s.jel_links);
        }
    }

    println!("\nDone in {}", format_duration(t0.elapsed()));
    Ok(())
}

fn open(path: &Path) -> Result<rusqlite::Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    let conn = db::connect(path).with_context(|| format!("Cannot open {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Non-empty, non-comment lines of a text file.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn read_jel(path: &Path) -> Result<Vec<(String, Option<String>, Option<String>)>> {
    let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    Ok(read_lines(path)?
        .iter()
        .map(|line| {
            let mut cols = line.split('\t');
            let code = cols.next().unwrap_or_default().trim().to_uppercase();
            (code, non_empty(cols.next()), non_empty(cols.next()))
        })
        .collect())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
