/// Configuration for the translation session
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::flatten::DEFAULT_SEPARATOR;
use crate::pipeline::DEFAULT_EVENT_BUFFER;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateOptions {
    /// Send markup to the backend instead of stripping it first
    #[serde(default)]
    pub preserve_markup: bool,
    /// Turn line breaks in backend output back into `\n` escapes
    #[serde(default = "default_true")]
    pub restore_newline_escapes: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            preserve_markup: false,
            restore_newline_escapes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// 덮어쓰기 전에 기존 파일을 .bak 으로 보관
    #[serde(default = "default_true")]
    pub backup_existing: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            backup_existing: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_indent() -> usize {
    4
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatorConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub translate: TranslateOptions,
    #[serde(default)]
    pub batch: BatchOptions,
    #[serde(default)]
    pub output: OutputOptions,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            translate: TranslateOptions::default(),
            batch: BatchOptions::default(),
            output: OutputOptions::default(),
        }
    }
}

impl TranslatorConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::from_json(&content)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let content = self.to_json()?;

        fs::write(path, content).map_err(|e| format!("Failed to write config file: {}", e))
    }

    /// Load the file at `path`, falling back to defaults when it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        if path.as_ref().exists() {
            Self::from_json_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse JSON config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))
    }

    fn validate(&self) -> Result<(), String> {
        if self.separator.is_empty() {
            return Err("Key separator must not be empty".into());
        }
        Ok(())
    }
}

/// Per-user config location, e.g. `~/.config/string-table-translator/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("string-table-translator")
        .join("config.json")
}
