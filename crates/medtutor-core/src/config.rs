use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MedtutorError, Result};

/// Top-level configuration for the MedTutor application.
///
/// Loaded from `~/.medtutor/config.toml` by default. Each section corresponds
/// to one concern of the client: provider access, chat behaviour, uploads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedtutorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl MedtutorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MedtutorConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MedtutorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `MEDTUTOR_ENDPOINT_URL`, `MEDTUTOR_API_KEY` and `MEDTUTOR_PORT`
    /// on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MEDTUTOR_ENDPOINT_URL") {
            if !url.trim().is_empty() {
                self.provider.endpoint_url = Some(url.trim().to_string());
            }
        }
        if let Ok(key) = std::env::var("MEDTUTOR_API_KEY") {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(port) = std::env::var("MEDTUTOR_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.general.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid MEDTUTOR_PORT"),
            }
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.chat.default_temperature) {
            return Err(MedtutorError::Config(format!(
                "chat.default_temperature must be within [0, 1], got {}",
                self.chat.default_temperature
            )));
        }
        if self.chat.default_max_tokens == 0 {
            return Err(MedtutorError::Config(
                "chat.default_max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.chat.max_images == 0 {
            return Err(MedtutorError::Config(
                "chat.max_images must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory with a leading `~/` expanded to the home directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }
}

/// Expand a leading `~/` to `$HOME` (or `%USERPROFILE%` on Windows).
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the conversation database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.medtutor/data".to_string(),
            log_level: "info".to_string(),
            port: 8080,
        }
    }
}

/// Model provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Dedicated endpoint URL; `:predict` is appended when missing.
    pub endpoint_url: Option<String>,
    /// Bearer token sent with every request.
    pub api_key: Option<String>,
    /// Whole-request timeout for non-streaming calls.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// Chat behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of prior turns sent along with a new message.
    pub history_window: usize,
    /// Maximum images attached to one message.
    pub max_images: usize,
    /// Temperature used by the settings connection test.
    pub default_temperature: f32,
    /// Token budget used when a request does not carry one.
    pub default_max_tokens: u32,
    /// System prompt for raw proxy calls that carry none.
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_images: 5,
            default_temperature: 0.3,
            default_max_tokens: 2048,
            system_prompt:
                "You are a helpful medical assistant. Sempre responda em português do Brasil."
                    .to_string(),
        }
    }
}

/// Image upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes.
    pub max_file_size: usize,
    /// Accepted MIME types.
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 30 * 1024 * 1024,
            allowed_types: [
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                "image/bmp",
                "image/tiff",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl UploadConfig {
    /// Reject MIME types outside `allowed_types`.
    pub fn check_type(&self, mime_type: &str) -> Result<()> {
        if self.allowed_types.iter().any(|t| t == mime_type) {
            Ok(())
        } else {
            Err(MedtutorError::UnsupportedMediaType(mime_type.to_string()))
        }
    }

    /// Reject payloads larger than `max_file_size`.
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_file_size {
            Err(MedtutorError::PayloadTooLarge {
                size,
                limit: self.max_file_size,
            })
        } else {
            Ok(())
        }
    }

    /// `max_file_size` in mebibytes.
    pub fn max_file_size_mb(&self) -> f64 {
        self.max_file_size as f64 / (1024.0 * 1024.0)
    }

    /// File extensions matching `allowed_types`, for display in the client.
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_types
            .iter()
            .flat_map(|mime| match mime.as_str() {
                "image/jpeg" => vec![".jpg", ".jpeg"],
                "image/png" => vec![".png"],
                "image/webp" => vec![".webp"],
                "image/gif" => vec![".gif"],
                "image/bmp" => vec![".bmp"],
                "image/tiff" => vec![".tiff"],
                _ => vec![],
            })
            .map(str::to_string)
            .collect()
    }
}
