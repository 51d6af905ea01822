//! cfstore operator tool
//!
//! Inspects and repairs SSTable generations on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use cfstore::compaction::CompactionExecutor;
use cfstore::sstable::{Component, DataScanner, Descriptor, SSTableReader};
use cfstore::{Config, PartitionerKind, StorageContext, StoreError};
use tracing_subscriber::{fmt, EnvFilter};

/// cfstore operator tool
#[derive(Parser, Debug)]
#[command(name = "cfstore-tool")]
#[command(about = "Inspect, verify and rebuild cfstore sstables")]
#[command(version)]
struct Args {
    /// Partitioner the sstables were written with
    #[arg(short, long, value_enum, default_value = "byte-ordered")]
    partitioner: PartitionerArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PartitionerArg {
    ByteOrdered,
    Hash,
}

impl From<PartitionerArg> for PartitionerKind {
    fn from(arg: PartitionerArg) -> Self {
        match arg {
            PartitionerArg::ByteOrdered => PartitionerKind::ByteOrdered,
            PartitionerArg::Hash => PartitionerKind::Hash,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the generations in a directory and their components
    List {
        /// Keyspace directory
        dir: PathBuf,
    },

    /// Strictly open a generation and check every component
    Verify {
        /// Path to the generation's Data component
        data_file: PathBuf,
    },

    /// Print the rows of a Data component
    Dump {
        /// Path to the generation's Data component
        data_file: PathBuf,

        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rebuild the derived components of a generation from its Data component
    Rebuild {
        /// Path to the generation's Data component
        data_file: PathBuf,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cfstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> cfstore::Result<()> {
    match args.command {
        Commands::List { dir } => list(&dir),
        Commands::Verify { data_file } => {
            let (descriptor, ctx) = open_target(&data_file, args.partitioner)?;
            let reader = SSTableReader::open(&descriptor, &ctx)?;
            println!(
                "{}: ok ({} rows, {} columns, {} bytes)",
                descriptor,
                reader.row_count(),
                reader.stats().column_count,
                reader.data_length()
            );
            Ok(())
        }
        Commands::Dump { data_file, limit } => {
            let (descriptor, ctx) = open_target(&data_file, args.partitioner)?;
            let scanner = DataScanner::open(&descriptor, ctx.partitioner().clone())?;
            for row in scanner.take(limit.unwrap_or(usize::MAX)) {
                let row = row?;
                println!("{} @{}", row.key, row.offset);
                for column in row.decode()?.iter() {
                    println!(
                        "    {} = {}{} {:?}",
                        String::from_utf8_lossy(column.name()),
                        String::from_utf8_lossy(column.value()),
                        if column.is_tombstone() { " (deleted)" } else { "" },
                        column.clock()
                    );
                }
            }
            Ok(())
        }
        Commands::Rebuild { data_file } => {
            let (descriptor, ctx) = open_target(&data_file, args.partitioner)?;
            let executor = CompactionExecutor::new(ctx)?;
            let reader = executor
                .submit_rebuild(&descriptor)
                .wait()
                .map_err(|e| StoreError::Rebuild(e.to_string()))?;
            println!("{}: rebuilt ({} rows)", descriptor, reader.row_count());
            Ok(())
        }
    }
}

fn list(dir: &Path) -> cfstore::Result<()> {
    let descriptors = Descriptor::list(dir)?;
    if descriptors.is_empty() {
        println!("no sstables in {}", dir.display());
    }
    for descriptor in descriptors {
        let present: Vec<&str> = Component::ALL
            .iter()
            .filter(|c| descriptor.exists(**c))
            .map(|c| c.name())
            .collect();
        println!("{}  [{}]", descriptor, present.join(", "));
    }
    Ok(())
}

/// Resolve a Data component path into its descriptor and a context to read it with
fn open_target(
    data_file: &Path,
    partitioner: PartitionerArg,
) -> cfstore::Result<(Descriptor, std::sync::Arc<StorageContext>)> {
    let (descriptor, component) = Descriptor::from_filename(data_file).ok_or_else(|| {
        StoreError::Validation(format!("not an sstable component: {}", data_file.display()))
    })?;
    if component != Component::Data {
        return Err(StoreError::Validation(format!(
            "expected a Data component, got {}",
            component.name()
        )));
    }

    let config = Config::builder()
        .data_dir(descriptor.directory())
        .partitioner(partitioner.into())
        .build();
    let ctx = StorageContext::new(config)?;
    Ok((descriptor, ctx))
}
