//! Application configuration for ContentFill.
//!
//! User config lives at `~/.contentfill/contentfill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ContentFillError, Result};
use crate::types::is_invalid_title;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentfill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentfill";

/// Title written when no title can be generated.
pub const DEFAULT_PLACEHOLDER_TITLE: &str = "Untitled Content";

/// Hard cap on generated title length, in characters.
pub const DEFAULT_MAX_TITLE_LENGTH: usize = 100;

/// Marker after which a model's real answer starts.
pub const DEFAULT_PREAMBLE_MARKER: &str = "Final Output";

/// Minimum similarity ratio for an approximate category match.
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.4;

/// Maximum number of approximate category candidates kept.
pub const DEFAULT_MAX_CLOSE_MATCHES: usize = 3;

// ---------------------------------------------------------------------------
// Config structs (matching contentfill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Enrichment behaviour.
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.contentfill/content.db".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1/chat/completions".into()
}
fn default_model() -> String {
    "llama3.1".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Generated titles are hard-cut to this many characters.
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,

    /// Title assigned when generation is unavailable or fails.
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,

    /// Everything up to and including this marker is discarded from answers.
    #[serde(default = "default_preamble_marker")]
    pub preamble_marker: String,

    /// Minimum similarity ratio for approximate category matches.
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f64,

    /// Number of approximate category candidates considered.
    #[serde(default = "default_max_close_matches")]
    pub max_close_matches: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_title_length: default_max_title_length(),
            placeholder_title: default_placeholder_title(),
            preamble_marker: default_preamble_marker(),
            similarity_cutoff: default_similarity_cutoff(),
            max_close_matches: default_max_close_matches(),
        }
    }
}

fn default_max_title_length() -> usize {
    DEFAULT_MAX_TITLE_LENGTH
}
fn default_placeholder_title() -> String {
    DEFAULT_PLACEHOLDER_TITLE.into()
}
fn default_preamble_marker() -> String {
    DEFAULT_PREAMBLE_MARKER.into()
}
fn default_similarity_cutoff() -> f64 {
    DEFAULT_SIMILARITY_CUTOFF
}
fn default_max_close_matches() -> usize {
    DEFAULT_MAX_CLOSE_MATCHES
}

impl AppConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let e = &self.enrichment;
        if !(0.0..=1.0).contains(&e.similarity_cutoff) {
            return Err(ContentFillError::config(format!(
                "enrichment.similarity_cutoff must be within [0, 1], got {}",
                e.similarity_cutoff
            )));
        }
        if e.max_title_length == 0 {
            return Err(ContentFillError::config(
                "enrichment.max_title_length must be greater than 0",
            ));
        }
        if e.max_close_matches == 0 {
            return Err(ContentFillError::config(
                "enrichment.max_close_matches must be greater than 0",
            ));
        }
        if is_invalid_title(&e.placeholder_title) {
            return Err(ContentFillError::config(format!(
                "enrichment.placeholder_title must be a valid title, got '{}'",
                e.placeholder_title
            )));
        }

        let endpoint = Url::parse(&self.generation.endpoint).map_err(|err| {
            ContentFillError::config(format!(
                "invalid generation.endpoint '{}': {err}",
                self.generation.endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ContentFillError::config(format!(
                "generation.endpoint must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }
        Ok(())
    }

    /// Resolved database path with `~` expanded.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.database.path)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ContentFillError::config("could not determine home directory"))?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentfill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContentFillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentfill/contentfill.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContentFillError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ContentFillError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContentFillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContentFillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContentFillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("placeholder_title"));
        assert!(toml_str.contains("Untitled Content"));
        assert!(toml_str.contains("similarity_cutoff"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.enrichment.max_title_length, 100);
        assert_eq!(parsed.enrichment.max_close_matches, 3);
        assert_eq!(parsed.generation.model, "llama3.1");
        parsed.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml_str = r#"
[enrichment]
similarity_cutoff = 0.6

[generation]
model = "qwen2.5"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.enrichment.similarity_cutoff, 0.6);
        assert_eq!(config.enrichment.placeholder_title, DEFAULT_PLACEHOLDER_TITLE);
        assert_eq!(config.generation.model, "qwen2.5");
        assert_eq!(config.generation.timeout_secs, 120);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.enrichment.similarity_cutoff = 1.5;
        assert!(config.validate().unwrap_err().to_string().contains("similarity_cutoff"));

        let mut config = AppConfig::default();
        config.enrichment.max_title_length = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.enrichment.placeholder_title = "   ".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.enrichment.placeholder_title = "Untitled".into();
        assert!(config.validate().unwrap_err().to_string().contains("placeholder_title"));

        let mut config = AppConfig::default();
        config.generation.endpoint = "ftp://models.local/v1".into();
        assert!(config.validate().unwrap_err().to_string().contains("http(s)"));

        let mut config = AppConfig::default();
        config.generation.endpoint = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home("/var/data/content.db").unwrap(),
            PathBuf::from("/var/data/content.db")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home("~/.contentfill/content.db").unwrap(),
                home.join(".contentfill/content.db")
            );
        }
    }
}
