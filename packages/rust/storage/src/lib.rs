//! Record store for ContentFill.
//!
//! [`ContentStore`] is the contract the enrichment orchestrator talks to.
//! [`LibsqlStore`] implements it on top of a local libSQL database that owns
//! its schema (`content` and `content_category` tables).
//!
//! **Selection rules:**
//! - null title: `title IS NULL`
//! - invalid title: present, but blank or a placeholder token (`null`,
//!   `none`, `undefined`, `n/a`, `untitled`, case-insensitive)
//! - without description: blank or null description and a valid title

mod migrations;

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use contentfill_shared::{
    Category, CategoryId, ContentFillError, ContentId, ContentRecord, DescriptionCandidate,
    INVALID_TITLE_TOKENS, NewContent, PendingCounts, RecordUpdate, Result, TitleCandidate,
};
use libsql::{Connection, Database, params};

/// SQL predicate matching a present but unusable title.
fn invalid_title_sql() -> String {
    let tokens = INVALID_TITLE_TOKENS
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("(title IS NOT NULL AND (TRIM(title) = '' OR LOWER(TRIM(title)) IN ({tokens})))")
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Record store consumed by the enrichment orchestrator.
///
/// All selection methods return rows in a stable order (ascending id).
pub trait ContentStore: Send + Sync {
    /// Open the underlying connection.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the underlying connection. Closing a closed store is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// All active categories.
    fn get_categories(&self) -> impl Future<Output = Result<Vec<Category>>> + Send;

    /// Records whose title is null.
    fn get_records_with_null_title(
        &self,
    ) -> impl Future<Output = Result<Vec<TitleCandidate>>> + Send;

    /// Records whose title is present but invalid.
    fn get_records_with_invalid_title(
        &self,
    ) -> impl Future<Output = Result<Vec<TitleCandidate>>> + Send;

    /// Records with a valid title and no description.
    fn get_records_without_description(
        &self,
    ) -> impl Future<Output = Result<Vec<DescriptionCandidate>>> + Send;

    /// Write the fields set in `update`; the others stay unchanged.
    fn update_record(
        &self,
        id: ContentId,
        update: &RecordUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create a category. `Ok(None)` means the store declined to create it.
    fn insert_category(
        &self,
        title: &str,
    ) -> impl Future<Output = Result<Option<CategoryId>>> + Send;
}

// ---------------------------------------------------------------------------
// libSQL implementation
// ---------------------------------------------------------------------------

/// Local libSQL-backed store.
pub struct LibsqlStore {
    path: PathBuf,
    handle: Option<Handle>,
}

struct Handle {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

fn db_err(e: libsql::Error) -> ContentFillError {
    ContentFillError::Storage(e.to_string())
}

impl LibsqlStore {
    /// Create a store for the database at `path`. Nothing is opened until
    /// [`ContentStore::connect`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    /// Create a store and connect it right away.
    pub async fn open(path: &Path) -> Result<Self> {
        let mut store = Self::new(path);
        store.connect().await?;
        Ok(store)
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn conn(&self) -> Result<&Connection> {
        self.handle
            .as_ref()
            .map(|h| &h.conn)
            .ok_or_else(|| ContentFillError::Storage("not connected".into()))
    }

    /// Run pending schema migrations.
    async fn run_migrations(conn: &Connection) -> Result<()> {
        let current_version = Self::get_schema_version(conn).await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    ContentFillError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(conn: &Connection) -> u32 {
        let result = conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn title_candidates(&self, predicate: &str) -> Result<Vec<TitleCandidate>> {
        let sql = format!("SELECT id, description FROM content WHERE {predicate} ORDER BY id");
        let mut rows = self.conn()?.query(&sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(TitleCandidate {
                id: ContentId(row.get::<i64>(0).map_err(db_err)?),
                description: row.get::<String>(1).ok(),
            });
        }
        Ok(results)
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn()?.query(sql, params![]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers outside the orchestrator contract
    // -----------------------------------------------------------------------

    /// Insert a content row. Returns the assigned id.
    pub async fn insert_content(&self, content: &NewContent) -> Result<ContentId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO content (title, description) VALUES (?1, ?2)",
            params![content.title.as_deref(), content.description.as_deref()],
        )
        .await
        .map_err(db_err)?;
        Ok(ContentId(conn.last_insert_rowid()))
    }

    /// Fetch a content row by id.
    pub async fn get_record(&self, id: ContentId) -> Result<Option<ContentRecord>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, title, description, category_id FROM content WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(ContentRecord {
                id: ContentId(row.get::<i64>(0).map_err(db_err)?),
                title: row.get::<String>(1).ok(),
                description: row.get::<String>(2).ok(),
                category_id: row.get::<i64>(3).ok().map(CategoryId),
            })),
            None => Ok(None),
        }
    }

    /// Number of records each phase would select right now.
    pub async fn pending_counts(&self) -> Result<PendingCounts> {
        Ok(PendingCounts {
            null_title: self
                .count("SELECT COUNT(*) FROM content WHERE title IS NULL")
                .await?,
            invalid_title: self
                .count(&format!(
                    "SELECT COUNT(*) FROM content WHERE {}",
                    invalid_title_sql()
                ))
                .await?,
            missing_description: self
                .count(&format!(
                    "SELECT COUNT(*) FROM content WHERE {}",
                    missing_description_sql()
                ))
                .await?,
            categories: self
                .count("SELECT COUNT(*) FROM content_category WHERE is_active = 1")
                .await?,
        })
    }
}

fn missing_description_sql() -> String {
    format!(
        "(description IS NULL OR TRIM(description) = '') \
         AND title IS NOT NULL AND NOT {}",
        invalid_title_sql()
    )
}

impl ContentStore for LibsqlStore {
    async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ContentFillError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(&self.path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Self::run_migrations(&conn).await?;
        tracing::debug!(path = %self.path.display(), "store connected");

        self.handle = Some(Handle { db, conn });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.handle.take().is_some() {
            tracing::debug!(path = %self.path.display(), "store disconnected");
        }
        Ok(())
    }

    async fn get_categories(&self) -> Result<Vec<Category>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, title FROM content_category WHERE is_active = 1 ORDER BY id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Category {
                id: CategoryId(row.get::<i64>(0).map_err(db_err)?),
                title: row.get::<String>(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    async fn get_records_with_null_title(&self) -> Result<Vec<TitleCandidate>> {
        self.title_candidates("title IS NULL").await
    }

    async fn get_records_with_invalid_title(&self) -> Result<Vec<TitleCandidate>> {
        self.title_candidates(&invalid_title_sql()).await
    }

    async fn get_records_without_description(&self) -> Result<Vec<DescriptionCandidate>> {
        let sql = format!(
            "SELECT id, title FROM content WHERE {} ORDER BY id",
            missing_description_sql()
        );
        let mut rows = self.conn()?.query(&sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(DescriptionCandidate {
                id: ContentId(row.get::<i64>(0).map_err(db_err)?),
                title: row.get::<String>(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    async fn update_record(&self, id: ContentId, update: &RecordUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(ContentFillError::validation(format!(
                "empty update for content {id}"
            )));
        }

        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()?
            .execute(
                "UPDATE content SET
                   title = COALESCE(?1, title),
                   description = COALESCE(?2, description),
                   category_id = COALESCE(?3, category_id),
                   updated_at = ?4
                 WHERE id = ?5",
                params![
                    update.title.as_deref(),
                    update.description.as_deref(),
                    update.category_id.map(|c| c.0),
                    now.as_str(),
                    id.0,
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(ContentFillError::Storage(format!("content {id} not found")));
        }
        Ok(())
    }

    async fn insert_category(&self, title: &str) -> Result<Option<CategoryId>> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT INTO content_category (title) VALUES (?1) ON CONFLICT DO NOTHING",
                params![title],
            )
            .await
            .map_err(db_err)?;

        if inserted == 0 {
            tracing::debug!(title, "category already exists, insert declined");
            return Ok(None);
        }
        Ok(Some(CategoryId(conn.last_insert_rowid())))
    }
}
