//! SQL migration definitions for the ContentFill database.
//!
//! Migrations are applied in order on connect. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: content_category, content",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Categories; titles are unique ignoring case
CREATE TABLE IF NOT EXISTS content_category (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    title      TEXT NOT NULL,
    is_active  INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_content_category_title
    ON content_category(lower(title));

-- Content records subject to enrichment
CREATE TABLE IF NOT EXISTS content (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT,
    description TEXT,
    category_id INTEGER REFERENCES content_category(id),
    updated_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_content_category ON content(category_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
