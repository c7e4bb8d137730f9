use crate::core::conda::validate_env_name;
use crate::domain::model::CropSeason;
use crate::utils::error::Result;
use crate::utils::validation::{validate_range, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "ftw-runner")]
#[command(about = "Download Sentinel-2 season pairs and run Fields of The World models")]
pub struct CliConfig {
    /// Path to a TOML run configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the settings file location
    #[arg(long, global = true)]
    pub settings_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log CPU and memory of spawned processes")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Compute the two search windows from SOS/EOS dates
    Windows {
        #[arg(long)]
        sos: String,
        #[arg(long)]
        eos: String,
    },
    /// Parse "lon,lat; lon,lat [EPSG:xxxx]" and print WGS84 corners
    Bbox { coordinates: String },
    /// Look up SOS/EOS dates for a region from the season table
    Season(SeasonArgs),
    /// Search the catalog and download a stacked 8-band raster
    Download(DownloadArgs),
    /// Create or repair the conda environment
    Setup,
    /// Run field-boundary inference on an 8-band raster
    Infer(InferArgs),
    /// List known model checkpoints
    Models,
    /// Print band count and suggested composites of a raster
    Inspect { raster: PathBuf },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SeasonArgs {
    /// Region; without it the lookup is skipped
    #[arg(long)]
    pub bbox: Option<String>,
    #[arg(long)]
    pub season: CropSeason,
    #[arg(long)]
    pub year: i32,
    /// Season calendar CSV (season,lon,lat,sos_doy,eos_doy)
    #[arg(long)]
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    #[arg(long)]
    pub bbox: String,
    /// Start of season (YYYY-MM-DD)
    #[arg(long, requires = "eos")]
    pub sos: Option<String>,
    /// End of season (YYYY-MM-DD)
    #[arg(long, requires = "sos")]
    pub eos: Option<String>,
    /// Fill SOS/EOS from the season table instead
    #[arg(long, conflicts_with = "sos", requires = "year")]
    pub season: Option<CropSeason>,
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long)]
    pub table: Option<PathBuf>,
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Overrides catalog.max_cloud_cover
    #[arg(long)]
    pub max_cloud: Option<u8>,
    /// Only report the selected scenes
    #[arg(long)]
    pub search_only: bool,
}

#[derive(Debug, Clone, Args)]
pub struct InferArgs {
    #[arg(long)]
    pub raster: PathBuf,
    #[arg(long, default_value = "FTW 3 Classes")]
    pub model: String,
    /// Local checkpoint instead of a release model
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub polygonize: bool,
    #[arg(long, default_value = "20")]
    pub simplify: f64,
    /// Skip the environment check before inference
    #[arg(long)]
    pub skip_setup: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SettingsAction {
    Show,
    Set {
        /// conda install root or path to conda.sh
        #[arg(long)]
        conda_path: Option<PathBuf>,
        #[arg(long)]
        env_name: Option<String>,
    },
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Download(args) => {
                if let Some(max_cloud) = args.max_cloud {
                    validate_range("max_cloud", max_cloud, 0, 100)?;
                }
            }
            Command::Infer(args) => {
                validate_range("simplify", args.simplify, 0.0, 1_000_000.0)?;
            }
            Command::Settings {
                action:
                    SettingsAction::Set {
                        env_name: Some(name),
                        ..
                    },
            } => validate_env_name(name)?,
            _ => {}
        }
        Ok(())
    }
}
