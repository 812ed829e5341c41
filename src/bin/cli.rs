//! hgindex CLI
//!
//! Offline inspection and maintenance of a store directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hgindex::engine::Engine;
use hgindex::manager::IndexNamespaceName;
use hgindex::wal::WalRecovery;
use hgindex::{ComparatorRegistry, Config, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// hgindex CLI
#[derive(Parser, Debug)]
#[command(name = "hgindex-cli")]
#[command(about = "Inspect and maintain an hgindex store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./hgindex_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List namespaces and what they hold
    Namespaces,

    /// Check WAL integrity without modifying it
    Verify,

    /// Rewrite the WAL so it holds only live records
    Compact,
}

fn namespaces(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    for name in Engine::list_namespaces(data_dir)? {
        match IndexNamespaceName::parse(&name) {
            Ok(Some(identity)) => println!(
                "{:<10} {:<24} key={} value={}",
                if identity.inverse { "inverse" } else { "index" },
                identity.index,
                identity.key_comparator.as_deref().unwrap_or("bytewise"),
                identity.value_comparator.as_deref().unwrap_or("bytewise"),
            ),
            Ok(None) => println!("{:<10} {}", "primary", name),
            Err(e) => println!("{:<10} {} ({})", "invalid", name, e),
        }
    }
    Ok(())
}

fn verify(data_dir: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let wal_path = data_dir.join("wal.log");
    if !wal_path.exists() {
        println!("no WAL at {}", wal_path.display());
        return Ok(true);
    }
    let result = WalRecovery::verify(&wal_path)?;
    println!("entries:   {}", result.entries_recovered);
    println!("last LSN:  {}", result.last_lsn);
    println!("corrupted: {}", result.entries_corrupted);
    Ok(result.entries_corrupted == 0)
}

fn compact(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder().data_dir(data_dir).create_if_missing(false).build();
    let store = Store::open(config, &ComparatorRegistry::new())?;
    let before = store.engine().wal_size();
    store.compact()?;
    println!("WAL: {} -> {} bytes", before, store.engine().wal_size());
    store.close()?;
    Ok(())
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hgindex=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::debug!("hgindex CLI v{}", hgindex::VERSION);

    let outcome = match args.command {
        Commands::Namespaces => namespaces(&args.data_dir).map(|_| true),
        Commands::Verify => verify(&args.data_dir),
        Commands::Compact => compact(&args.data_dir).map(|_| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
