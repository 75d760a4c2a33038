//! Core domain types shared by the store, the generator and the orchestrator.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Store-assigned identifier of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub i64);

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Title validity
// ---------------------------------------------------------------------------

/// Lowercase title values that count as "no title" even though present.
pub const INVALID_TITLE_TOKENS: &[&str] = &["null", "none", "undefined", "n/a", "untitled"];

/// Whether a present title is unusable: blank, or one of
/// [`INVALID_TITLE_TOKENS`] ignoring case and surrounding whitespace.
pub fn is_invalid_title(title: &str) -> bool {
    let normalized = title.trim().to_lowercase();
    normalized.is_empty() || INVALID_TITLE_TOKENS.contains(&normalized.as_str())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A category row as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
}

/// A full content row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
}

/// A record selected by one of the title phases.
///
/// The description is whatever the store holds, which may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleCandidate {
    pub id: ContentId,
    pub description: Option<String>,
}

/// A record selected by the missing-description phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionCandidate {
    pub id: ContentId,
    pub title: String,
}

/// Partial update of a content record. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
}

impl RecordUpdate {
    /// Update that sets only the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Update that sets the description and, when known, the category.
    pub fn description(description: impl Into<String>, category_id: Option<CategoryId>) -> Self {
        Self {
            description: Some(description.into()),
            category_id,
            ..Default::default()
        }
    }

    /// True when no field would be written.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.category_id.is_none()
    }
}

/// A content row to seed into the store (used by `import`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Number of records each phase would currently select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub null_title: u64,
    pub invalid_title: u64,
    pub missing_description: u64,
    pub categories: u64,
}
