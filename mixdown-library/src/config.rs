//! Simple configuration persistence for mixdown
//!
//! Stores export defaults, the loader's target rate and the last folder files
//! were loaded from.

use mixdown_audio::Gain;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where `export` writes when no path is given
    pub export_path: PathBuf,
    /// Gain applied to newly loaded tracks
    pub default_gain: f32,
    /// Resample every loaded track to this rate
    pub target_sample_rate: Option<u32>,
    /// Fewest tracks an export accepts
    pub min_export_tracks: usize,
    /// Folder the last loaded file came from
    pub last_load_folder: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_path: PathBuf::from("mix.wav"),
            default_gain: 1.0,
            target_sample_rate: None,
            min_export_tracks: 2,
            last_load_folder: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mixdown")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key {
                "export_path" => config.export_path = PathBuf::from(value),
                "default_gain" => match value.parse::<f32>() {
                    Ok(gain) if !gain.is_nan() => {
                        config.default_gain = gain.clamp(Gain::MIN, Gain::MAX);
                    }
                    _ => warn!(value, "ignoring invalid default_gain"),
                },
                "target_sample_rate" => match value.parse::<u32>() {
                    Ok(rate) if rate > 0 => config.target_sample_rate = Some(rate),
                    _ => warn!(value, "ignoring invalid target_sample_rate"),
                },
                "min_export_tracks" => match value.parse::<usize>() {
                    Ok(n) if n > 0 => config.min_export_tracks = n,
                    _ => warn!(value, "ignoring invalid min_export_tracks"),
                },
                "last_load_folder" => config.last_load_folder = Some(PathBuf::from(value)),
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# mixdown configuration".to_string(),
            format!("export_path={}", self.export_path.display()),
            format!("default_gain={}", self.default_gain),
            format!("min_export_tracks={}", self.min_export_tracks),
        ];

        if let Some(rate) = self.target_sample_rate {
            lines.push(format!("target_sample_rate={}", rate));
        }
        if let Some(ref folder) = self.last_load_folder {
            lines.push(format!("last_load_folder={}", folder.display()));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(Config::parse(""), Config::default());
    }

    #[test]
    fn test_parse_values() {
        let content = "export_path=/tmp/out.wav\ndefault_gain=0.5\ntarget_sample_rate=48000\nmin_export_tracks=1";
        let config = Config::parse(content);
        assert_eq!(config.export_path, PathBuf::from("/tmp/out.wav"));
        assert_eq!(config.default_gain, 0.5);
        assert_eq!(config.target_sample_rate, Some(48000));
        assert_eq!(config.min_export_tracks, 1);
    }

    #[test]
    fn test_parse_with_comments() {
        let content = "# Comment\nlast_load_folder=/music\n# Another comment";
        let config = Config::parse(content);
        assert_eq!(config.last_load_folder, Some(PathBuf::from("/music")));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let content = "default_gain=loud\ntarget_sample_rate=0\nmin_export_tracks=-1\nnonsense";
        assert_eq!(Config::parse(content), Config::default());
    }

    #[test]
    fn test_gain_is_clamped_into_range() {
        assert_eq!(Config::parse("default_gain=25").default_gain, 10.0);
        assert_eq!(Config::parse("default_gain=-2").default_gain, 0.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.txt");

        let config = Config {
            export_path: PathBuf::from("bounce.wav"),
            default_gain: 0.8,
            target_sample_rate: Some(44100),
            min_export_tracks: 3,
            last_load_folder: Some(PathBuf::from("/samples")),
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
