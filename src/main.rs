//! Operational CLI: refresh the store from raw extracts and inspect the
//! loaded snapshot.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use horizon_datakit::config::DataConfig;
use horizon_datakit::snapshot::Snapshot;
use horizon_datakit::store::HorizonStore;

#[derive(Parser)]
#[command(name = "horizon-datakit", version, about = "Horizon extract loader")]
struct Cli {
    /// Extract root directory (defaults to $HORIZON_DATA_DIR, then ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the raw extracts and print the per-table load report
    Refresh {
        /// Also write the normalized tables as parquet under processed/
        #[arg(long)]
        write_processed: bool,
    },
    /// Load the raw extracts and list the scientific fields
    Fields,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = DataConfig::resolve(cli.data_dir.as_deref());

    let result = match cli.command {
        Commands::Refresh { write_processed } => refresh(&cfg, write_processed),
        Commands::Fields => fields(&cfg),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn refresh(cfg: &DataConfig, write_processed: bool) -> horizon_datakit::Result<()> {
    let (store, report) = HorizonStore::load(cfg)?;
    if write_processed {
        store.write_processed(cfg)?;
    }
    let snapshot = Snapshot::build(store)?;
    print!("{report}");
    println!(
        "{} scientific fields, {} projects served",
        snapshot.scientific_fields().len(),
        snapshot.projects().height()
    );
    Ok(())
}

fn fields(cfg: &DataConfig) -> horizon_datakit::Result<()> {
    let (snapshot, _) = Snapshot::load(cfg)?;
    for field in snapshot.scientific_fields() {
        println!("{field}");
    }
    Ok(())
}
