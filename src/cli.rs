use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flavmux")]
#[command(author, version, about = "Interleave taste and scent tracks into MP4 files")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the box tree and tracks of an MP4 file
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-interleave the chunks of an MP4 file
    Compose {
        /// Input file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only lay out these track kinds (e.g. `vide,tast`)
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,
    },

    /// Encode frames from a JSON file and add them as a new track
    AddTrack {
        /// Input file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Track kind (`tast` or `scnt`)
        #[arg(long)]
        kind: String,

        /// Codec name, as registered (`raw5`, `rmix`)
        #[arg(long)]
        codec: String,

        /// JSON file holding an array of frames, each an array of integers
        #[arg(long)]
        frames: PathBuf,

        /// Element type of the frames
        #[arg(long, default_value = "uint8", value_parser = ["uint8", "uint16"])]
        dtype: String,

        /// Frames per second of the new track
        #[arg(long, default_value = "30")]
        fps: f64,
    },

    /// Decode every sample of a track and print the frames as JSON
    Extract {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Track kind to decode
        #[arg(long)]
        kind: String,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// List the registered sample codecs
    Codecs,

    /// Display version information
    Version,
}
