use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use terrain::SIMILAR_LIMIT;

/// Reconcile trail elevation sources and score terrain.
#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// JSON config file; missing fields take their defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Trail JSON file.
    #[arg(short, long)]
    pub trail: PathBuf,

    /// Directory of GeoTIFF elevation tiles.
    #[arg(long)]
    pub tile_dir: Option<PathBuf>,

    /// Point-cloud catalog JSON file.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Directory of LAS/LAZ files, cataloged from their headers.
    #[arg(long)]
    pub lidar_dir: Option<PathBuf>,

    /// Survey rows JSON file.
    #[arg(long)]
    pub survey: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print every elevation source as JSON.
    Sources(SourceArgs),

    /// Plot every available elevation source to the terminal.
    Plot(SourceArgs),

    /// Print the trail's ingestion analysis as JSON.
    Metrics {
        /// Trail JSON file.
        #[arg(short, long)]
        trail: PathBuf,
    },

    /// Rank candidate trails by similarity.
    Similar {
        /// Trail JSON file.
        #[arg(short, long)]
        trail: PathBuf,

        /// JSON array of candidate trails.
        #[arg(long)]
        candidates: PathBuf,

        #[arg(short, long, default_value_t = SIMILAR_LIMIT)]
        limit: usize,
    },
}
