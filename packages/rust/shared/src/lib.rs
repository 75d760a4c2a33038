//! Shared types, error model, and configuration for ContentFill.
//!
//! This crate is the foundation depended on by all other ContentFill crates.
//! It provides:
//! - [`ContentFillError`] the unified error type
//! - Domain types ([`ContentId`], [`Category`], [`RecordUpdate`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_MAX_CLOSE_MATCHES, DEFAULT_MAX_TITLE_LENGTH, DEFAULT_PLACEHOLDER_TITLE,
    DEFAULT_PREAMBLE_MARKER, DEFAULT_SIMILARITY_CUTOFF, DatabaseConfig, EnrichmentSettings,
    GenerationConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from,
};
pub use error::{ContentFillError, Result};
pub use types::{
    Category, CategoryId, ContentId, ContentRecord, DescriptionCandidate, INVALID_TITLE_TOKENS,
    NewContent, PendingCounts, RecordUpdate, TitleCandidate, is_invalid_title,
};
