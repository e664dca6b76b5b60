//! heapdb - command line tool for heap files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heapdb::access::{
    create_heap_file, destroy_heap_file, CompOp, HeapFile, HeapInserter, HeapScan, ScanPredicate,
};
use heapdb::storage::buffer::lru::LruReplacer;
use heapdb::storage::{BufferPoolManager, FileManager};
use std::path::PathBuf;

/// Inspect and modify heap files of variable-length records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory holding the heap files
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Number of buffer pool frames
    #[arg(long, default_value = "64")]
    pool_size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new heap file
    Create { name: String },
    /// Remove a heap file
    Destroy { name: String },
    /// Append the argument bytes as one record
    Insert { name: String, data: String },
    /// Print every record, optionally filtered on an integer field
    Scan {
        name: String,
        /// Byte offset of a 4-byte integer field to filter on
        #[arg(long, requires = "eq")]
        offset: Option<usize>,
        /// Keep only records whose field equals this value
        #[arg(long, requires = "offset")]
        eq: Option<i32>,
    },
    /// Show record and page counts
    Stats { name: String },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let file_manager =
        FileManager::new(&args.data_dir).context("failed to open the data directory")?;
    let replacer = Box::new(LruReplacer::new(args.pool_size));
    let pool = BufferPoolManager::new(file_manager, replacer, args.pool_size);

    match args.command {
        Command::Create { name } => {
            create_heap_file(&pool, &name)?;
            println!("created {}", name);
        }
        Command::Destroy { name } => {
            destroy_heap_file(&pool, &name)?;
            println!("destroyed {}", name);
        }
        Command::Insert { name, data } => {
            let mut inserter = HeapInserter::open(pool.clone(), &name)?;
            let rid = inserter.insert_record(data.as_bytes())?;
            println!("inserted record {}", rid);
        }
        Command::Scan { name, offset, eq } => {
            let mut scan = HeapScan::open(pool.clone(), &name)?;
            let predicate = match (offset, eq) {
                (Some(offset), Some(value)) => Some(ScanPredicate::int(offset, CompOp::Eq, value)),
                _ => None,
            };
            scan.start_scan(predicate)?;

            let mut count = 0u64;
            while let Some(rid) = scan.scan_next()? {
                let record = scan.get_record()?;
                println!(
                    "{}  {:5} bytes  {}",
                    rid,
                    record.len(),
                    String::from_utf8_lossy(&record.data)
                );
                count += 1;
            }
            println!("{} records", count);
        }
        Command::Stats { name } => {
            let mut file = HeapFile::open(pool.clone(), &name)?;
            println!("file:    {}", file.name());
            println!("records: {}", file.record_count()?);
            println!("pages:   {}", file.page_count()?);
        }
    }

    Ok(())
}
