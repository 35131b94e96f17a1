use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::options::{BorderStyle, Color, Crf, SpeedPreset};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that ffmpeg and ffprobe can be executed
    Check,

    /// Pick the best matching subtitle name for a video name
    Match {
        /// Video base name
        name: String,

        /// Candidate subtitle file names
        #[arg(required = true)]
        candidates: Vec<String>,

        /// Minimum similarity (exclusive) for a match
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Scan a folder and show the video/subtitle pairings
    Scan(SourceArgs),

    /// Burn subtitles into every paired video in a folder
    Run(RunArgs),

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the videos of a batch come from
#[derive(clap::Args)]
pub struct SourceArgs {
    /// Directory containing video files
    #[arg(short, long, required_unless_present = "add")]
    pub input_dir: Option<PathBuf>,

    /// Directory containing subtitle files (defaults to the input directory)
    #[arg(short, long)]
    pub subtitle_dir: Option<PathBuf>,

    /// Add a single video, matched against subtitles in its own folder
    #[arg(long = "add", value_name = "VIDEO")]
    pub add: Vec<PathBuf>,

    /// Minimum similarity (exclusive) for a match
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output directory (defaults to next to each source video)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Encoder speed preset
    #[arg(long, value_enum)]
    pub preset: Option<SpeedPreset>,

    /// Constant rate factor, 0-51, lower is better quality
    #[arg(long)]
    pub crf: Option<Crf>,

    /// Subtitle font family
    #[arg(long)]
    pub font_name: Option<String>,

    /// Subtitle font size
    #[arg(long)]
    pub font_size: Option<u32>,

    /// Subtitle text color as #RRGGBB
    #[arg(long)]
    pub color: Option<Color>,

    /// Subtitle border style
    #[arg(long, value_enum)]
    pub border_style: Option<BorderStyle>,

    /// Manual pairing override, VIDEO=SUBTITLE (video file name, subtitle path)
    #[arg(long = "pair", value_name = "VIDEO=SUBTITLE")]
    pub pairs: Vec<String>,

    /// Leave a video out of the batch (file name)
    #[arg(long = "exclude", value_name = "VIDEO")]
    pub excludes: Vec<String>,

    /// Print one JSON object per event instead of a progress bar
    #[arg(long)]
    pub json: bool,

    /// Store the encode settings of this run in the config file
    #[arg(long)]
    pub remember: bool,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        /// Where to write the file
        #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Split a `VIDEO=SUBTITLE` override
pub fn parse_pair(value: &str) -> Option<(&str, PathBuf)> {
    let (video, subtitle) = value.split_once('=')?;
    let video = video.trim();
    let subtitle = subtitle.trim();
    if video.is_empty() || subtitle.is_empty() {
        return None;
    }
    Some((video, PathBuf::from(subtitle)))
}
