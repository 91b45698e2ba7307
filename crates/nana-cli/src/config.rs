//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for nana
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key (alternative to NANA_API_KEY / GEMINI_API_KEY)
    pub api_key: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Default model
    pub model: Option<String>,
    /// Output resolution (1K, 2K, 4K)
    pub resolution: Option<String>,
    /// Aspect ratio (Auto, 1:1, 3:4, 4:3, 9:16, 16:9, 21:9)
    pub aspect_ratio: Option<String>,
    /// Google Search grounding
    pub grounding: Option<bool>,
    /// Include model reasoning
    pub thinking: Option<bool>,
    /// Stream partial output
    pub stream: Option<bool>,
    /// Where generated images are written
    pub output_dir: Option<String>,
    /// Where pipeline templates are read from
    pub templates_dir: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nana")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("NANA_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// API key from config, then NANA_API_KEY, then GEMINI_API_KEY
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("NANA_API_KEY").ok())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| PathBuf::from("nana-output"))
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| Self::config_dir().join("templates"))
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# nana configuration file
# Place at ~/.config/nana/config.toml (Linux) or set NANA_CONFIG_PATH

# API key (optional - NANA_API_KEY or GEMINI_API_KEY also work)
# api_key = "sk-..."

# API base URL
# endpoint = "https://api.apizoo.top"

# Default model
model = "gemini-3-pro-image-preview"

# Output resolution: 1K, 2K or 4K
resolution = "1K"

# Aspect ratio: Auto, 1:1, 3:4, 4:3, 9:16, 16:9, 21:9
aspect_ratio = "Auto"

# Google Search grounding
grounding = false

# Ask the model to include its reasoning
thinking = false

# Stream partial output while generating
stream = true

# Where generated images are written
output_dir = "nana-output"

# Pipeline templates (*.json)
# templates_dir = "~/.config/nana/templates"
"#
}
