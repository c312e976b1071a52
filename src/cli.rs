use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::protocol::Mood;

#[derive(Parser)]
#[command(name = "gazetalk", about = "Gaze keyboard with tunable speech synthesis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the interactive keyboard
    Run(RunArgs),
    /// List the parameter groups defined by a config file
    Describe {
        /// Path to config file (.toml or .json)
        config: PathBuf,
    },
    /// Send one request to the service and print the reply
    #[command(subcommand)]
    Request(RequestKind),
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Path to config file (.toml or .json)
    pub config: PathBuf,

    /// Override the service URL from the config
    #[arg(long)]
    pub url: Option<String>,

    /// Log file (the terminal is taken over by the interface)
    #[arg(long, default_value = "gazetalk.log")]
    pub log_file: PathBuf,
}

#[derive(Subcommand)]
pub enum RequestKind {
    /// Ask for three phrase completions
    Predict {
        text: String,
        #[command(flatten)]
        target: Target,
    },
    /// Ask for word suggestions for partial input
    Autocomplete {
        input: String,
        #[command(flatten)]
        target: Target,
    },
    /// Synthesise speech using the config's parameter values
    Synthesise {
        text: String,
        /// conversation, mixed or reading
        #[arg(long, default_value = "mixed", value_parser = parse_mood)]
        mood: Mood,
        /// Turn off advanced synthesis
        #[arg(long)]
        basic: bool,
        #[command(flatten)]
        target: Target,
    },
    /// Send a recorded audio file for transcription
    Transcribe {
        file: PathBuf,
        /// Media type (guessed from the file extension by default)
        #[arg(long)]
        mime: Option<String>,
        #[command(flatten)]
        target: Target,
    },
}

impl RequestKind {
    pub fn target(&self) -> &Target {
        match self {
            RequestKind::Predict { target, .. }
            | RequestKind::Autocomplete { target, .. }
            | RequestKind::Synthesise { target, .. }
            | RequestKind::Transcribe { target, .. } => target,
        }
    }
}

#[derive(clap::Args)]
pub struct Target {
    /// Config file supplying the service URL and parameters
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Service URL (overrides the config)
    #[arg(long)]
    pub url: Option<String>,

    /// Seconds to wait for the reply
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

fn parse_mood(s: &str) -> Result<Mood, String> {
    Mood::ALL
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            format!("unknown mood '{s}' (expected conversation, mixed or reading)")
        })
}
