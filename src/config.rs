use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name `discover` looks for
pub const CONFIG_FILE_NAME: &str = ".marshal.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarshalConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest request or reply payload a stream may grow to
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Longest inheritance chain walked before giving up
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `typelib_marshal=trace`
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatConfig,

    /// Trace every argument frame moved by a proxy or stub
    #[serde(default = "default_false")]
    pub dump_arguments: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatConfig {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_ancestor_depth: default_max_ancestor_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatConfig::default(),
            dump_arguments: false,
        }
    }
}

fn default_false() -> bool { false }
fn default_max_message_size() -> usize { 16 * 1024 * 1024 }
fn default_max_ancestor_depth() -> usize { 64 }
fn default_level() -> String { "info".to_string() }

impl MarshalConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.limits.max_message_size == 0 {
            return Err("limits.max_message_size must be positive".to_string());
        }
        if self.limits.max_ancestor_depth == 0 {
            return Err("limits.max_ancestor_depth must be positive".to_string());
        }
        Ok(())
    }

    /// Find `.marshal.toml` in the current directory or its parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// Walk up from `start` and load the first config file that parses
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut current: Option<PathBuf> = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return Some(config);
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}
