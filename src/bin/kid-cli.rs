//! KiD CLI
//!
//! Runs a single command against a local store directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kidkv::{Config, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// KiD CLI
#[derive(Parser, Debug)]
#[command(name = "kid-cli")]
#[command(about = "CLI for the KiD key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./kid_data")]
    data_dir: String,

    /// Number of index shards (power of two)
    #[arg(long, default_value = "16")]
    shards: usize,

    /// File-selector bits per address (fixed once the store exists)
    #[arg(long, default_value = "4")]
    file_bits: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print store statistics
    Stats,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kidkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .shard_count(args.shards)
        .address_file_bits(args.file_bits)
        .build();

    let store = match Store::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&store, args.command);
    let closed = store.close();

    match (outcome, closed) {
        (Ok(code), Ok(())) => code,
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(store: &Store, command: Commands) -> kidkv::Result<ExitCode> {
    match command {
        Commands::Get { key } => match store.get(key.as_bytes())? {
            Some(value) => {
                println!("{}", String::from_utf8_lossy(&value));
                Ok(ExitCode::SUCCESS)
            }
            None => {
                println!("(nil)");
                Ok(ExitCode::from(1))
            }
        },
        Commands::Put { key, value } => {
            store.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Del { key } => match store.delete(key.as_bytes())? {
            Some(value) => {
                println!("{}", String::from_utf8_lossy(&value));
                Ok(ExitCode::SUCCESS)
            }
            None => {
                println!("(nil)");
                Ok(ExitCode::from(1))
            }
        },
        Commands::Stats => {
            let stats = store.stats();
            println!("keys:        {}", stats.keys);
            println!("shards:      {}", stats.shards);
            println!("data files:  {}", stats.data_files);
            println!("free spans:  {}", stats.recycler.spans);
            println!("free bytes:  {}", stats.recycler.free_bytes);
            println!("hot entries: {}", stats.cache.hot_entries);
            println!("cold tiers:  {}", stats.cache.cold_tiers);
            Ok(ExitCode::SUCCESS)
        }
    }
}
