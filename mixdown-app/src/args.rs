//! Command-line arguments

use clap::Parser;
use mixdown_audio::Gain;
use std::path::PathBuf;

#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "mixdown",
    version,
    about = "Load audio files, audition them together and bounce a stereo WAV"
)]
pub struct Args {
    /// Read and save settings at PATH
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Export destination (default from config)
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,

    /// Gain for the next input file, in order (0.0 - 10.0)
    #[arg(short, long = "gain", value_name = "GAIN", value_parser = parse_gain)]
    pub gains: Vec<f32>,

    /// Mix the files to OUT and exit without playback
    #[arg(long)]
    pub export_only: bool,

    /// Audio files to load
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl Args {
    /// Check that every gain has a file to go with
    pub fn validated(self) -> Result<Self, String> {
        if self.gains.len() > self.files.len() {
            return Err(format!(
                "{} gains given for {} files",
                self.gains.len(),
                self.files.len()
            ));
        }
        Ok(self)
    }

    /// Gain for the file at `index`, if one was given
    pub fn gain_for(&self, index: usize) -> Option<f32> {
        self.gains.get(index).copied()
    }
}

fn parse_gain(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    Gain::new(value)
        .map(Gain::value)
        .map_err(|e| e.to_string())
}
