//! Enrichment logic for ContentFill.
//!
//! This crate ties the record store and the generation service together:
//! response parsing, category resolution, and the phased enrichment run
//! driven by [`EnrichmentOrchestrator`].

pub mod category;
pub mod enrichment;
pub mod parser;
pub mod prompts;
pub mod similarity;

pub use category::{CategoryCache, CategoryMatch, CategoryResolver, MatchKind};
pub use enrichment::{
    EnrichmentOrchestrator, EnrichmentProgress, EnrichmentReport, Phase, SilentEnrichmentProgress,
};
pub use parser::{ParseFailure, ParsedFields, ResponseParser};
