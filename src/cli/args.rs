use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use rasterconv::ProcessingMode;

#[derive(Parser)]
#[command(name = "rasterconv", version, about = "Raster format conversion over GDAL")]
pub struct CliArgs {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a raster to another format
    Convert(ConvertArgs),

    /// List raster drivers registered with GDAL
    Drivers {
        /// Include drivers that can only read
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the creation options a driver accepts
    Options {
        /// Driver short name, e.g. GTiff
        driver: String,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Input raster
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file. Derived from the input name and the driver's extension when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output driver short name (default: GTiff, or the preset's driver)
    #[arg(short = 'f', long)]
    pub format: Option<String>,

    /// Only let this driver open the input
    #[arg(long)]
    pub input_format: Option<String>,

    /// Creation option passed to the output driver, repeatable
    #[arg(long = "co", value_name = "KEY=VALUE")]
    pub creation_options: Vec<String>,

    /// Start from the defaults the driver advertises for its creation options
    #[arg(long, default_value_t = false)]
    pub with_defaults: bool,

    /// Processing mode (cpu or gpu)
    #[arg(long, value_enum)]
    pub mode: Option<ProcessingMode>,

    /// Worker threads for per-tile processing (default: available cores)
    #[arg(short = 'j', long)]
    pub jobs: Option<NonZeroUsize>,

    /// Tile edge length in pixels for block streaming
    #[arg(long)]
    pub tile_size: Option<usize>,

    /// Load settings from a preset file
    #[arg(long)]
    pub preset: Option<PathBuf>,

    /// Write the effective settings to a preset file before converting
    #[arg(long)]
    pub save_preset: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}
