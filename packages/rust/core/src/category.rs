//! Category resolution against the run-scoped category cache.

use tracing::{debug, info};

use contentfill_shared::{Category, CategoryId, DEFAULT_MAX_CLOSE_MATCHES, DEFAULT_SIMILARITY_CUTOFF};

use crate::similarity;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Known categories for one run, in store order.
///
/// Seeded from the store at run start and extended as categories are
/// created. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct CategoryCache {
    entries: Vec<(String, CategoryId)>,
}

impl CategoryCache {
    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut cache = Self::default();
        for category in categories {
            cache.insert(category.title, category.id);
        }
        cache
    }

    /// Add or replace the entry for `title` (exact spelling).
    pub fn insert(&mut self, title: impl Into<String>, id: CategoryId) {
        let title = title.into();
        match self.entries.iter_mut().find(|(t, _)| *t == title) {
            Some(entry) => entry.1 = id,
            None => self.entries.push((title, id)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// How a label was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Approximate,
}

/// A resolved category, with the cached title's original casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch {
    pub title: String,
    pub id: CategoryId,
    pub kind: MatchKind,
}

/// Maps free-text labels onto cached categories.
///
/// Order of attempts, first hit wins:
/// 1. case-insensitive exact match;
/// 2. up to `max_close_matches` titles with similarity `>= similarity_cutoff`,
///    best first;
/// 3. titles containing the label or contained in it, in cache order.
///
/// Candidates from 2 and 3 are deduplicated and the first one is returned.
#[derive(Debug, Clone, Copy)]
pub struct CategoryResolver {
    similarity_cutoff: f64,
    max_close_matches: usize,
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_CUTOFF, DEFAULT_MAX_CLOSE_MATCHES)
    }
}

impl CategoryResolver {
    pub fn new(similarity_cutoff: f64, max_close_matches: usize) -> Self {
        Self {
            similarity_cutoff,
            max_close_matches,
        }
    }

    pub fn resolve(&self, label: &str, cache: &CategoryCache) -> Option<CategoryMatch> {
        let target = label.trim().to_lowercase();
        if target.is_empty() {
            return None;
        }

        let lowered: Vec<String> = cache.entries.iter().map(|(t, _)| t.to_lowercase()).collect();
        let entry_for = |lower: &str| {
            lowered
                .iter()
                .position(|l| l == lower)
                .map(|idx| &cache.entries[idx])
        };

        if let Some((title, id)) = entry_for(target.as_str()) {
            debug!(label, matched = %title, "exact category match");
            return Some(CategoryMatch {
                title: title.clone(),
                id: *id,
                kind: MatchKind::Exact,
            });
        }

        let close = similarity::close_matches(
            &target,
            lowered.iter().map(String::as_str),
            self.max_close_matches,
            self.similarity_cutoff,
        );
        let partial = lowered
            .iter()
            .map(String::as_str)
            .filter(|l| !l.is_empty() && (l.contains(target.as_str()) || target.contains(*l)));

        let mut seen: Vec<&str> = Vec::new();
        for candidate in close.into_iter().chain(partial) {
            if !seen.contains(&candidate) {
                seen.push(candidate);
            }
        }

        let (title, id) = seen.first().and_then(|lower| entry_for(*lower))?;
        info!(label, matched = %title, "using closest category match");
        Some(CategoryMatch {
            title: title.clone(),
            id: *id,
            kind: MatchKind::Approximate,
        })
    }
}
