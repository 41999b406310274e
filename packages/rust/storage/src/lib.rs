//! Embedded libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding the crawled document
//! forest and the crawl job history. Uniqueness of a document URL is enforced by
//! the schema, and [`Storage::create`] is the authoritative dedup point: a second
//! insert of the same URL reports [`CreateOutcome::Existing`] instead of failing.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use uuid::Uuid;
use wikidigest_shared::{Document, DocumentId, NewDocument, Result, WikiDigestError};

/// Column list shared by every document query, in [`row_to_document`] order.
const DOCUMENT_COLUMNS: &str =
    "id, url, title, content, summary, parent_id, depth, is_processed, created_at, updated_at";

/// Result of a conditional document insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new row was written.
    Created(DocumentId),
    /// A row for the URL already existed; nothing was written.
    Existing(DocumentId),
}

impl CreateOutcome {
    /// The identifier of the row for the URL, new or not.
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }
}

/// A row of the `crawl_jobs` table.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlJob {
    pub id: String,
    pub root_url: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

fn storage_err(e: libsql::Error) -> WikiDigestError {
    WikiDigestError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WikiDigestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    WikiDigestError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert a document unless its URL is already stored.
    ///
    /// Concurrent crawls racing on the same URL both get the surviving row's id.
    pub async fn create(&self, doc: &NewDocument) -> Result<CreateOutcome> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO documents (url, title, content, parent_id, depth, is_processed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
                 ON CONFLICT(url) DO NOTHING
                 RETURNING id",
                params![
                    doc.url.as_str(),
                    doc.title.as_str(),
                    doc.content.as_str(),
                    doc.parent_id.map(|p| p.0),
                    i64::from(doc.depth),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        if let Some(row) = rows.next().await.map_err(storage_err)? {
            let id = row.get::<i64>(0).map_err(storage_err)?;
            return Ok(CreateOutcome::Created(DocumentId(id)));
        }
        drop(rows);

        match self.get_by_url(&doc.url).await? {
            Some(existing) => {
                tracing::debug!(url = %doc.url, id = %existing.id, "document already stored");
                Ok(CreateOutcome::Existing(existing.id))
            }
            None => Err(WikiDigestError::Storage(format!(
                "insert of {} was skipped but no row exists",
                doc.url
            ))),
        }
    }

    /// Get a document by its URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Document>> {
        self.query_one(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE url = ?1"),
            params![url],
        )
        .await
    }

    /// Get a document by its identifier.
    pub async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>> {
        self.query_one(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.0],
        )
        .await
    }

    /// Whether a document with this URL is stored.
    pub async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM documents WHERE url = ?1 LIMIT 1", params![url])
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    /// Store a summary and mark the document processed.
    pub async fn update_summary(&self, id: DocumentId, summary: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE documents SET summary = ?1, is_processed = 1, updated_at = ?2 WHERE id = ?3",
                params![summary, now.as_str(), id.0],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(WikiDigestError::Storage(format!("no document with id {id}")));
        }
        Ok(())
    }

    /// Number of documents whose parent is `id`.
    pub async fn count_children(&self, id: DocumentId) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM documents WHERE parent_id = ?1",
            params![id.0],
        )
        .await
    }

    /// Total number of stored documents.
    pub async fn count_documents(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM documents", params![]).await
    }

    /// Direct children of `id`, in insertion order.
    pub async fn list_children(&self, id: DocumentId) -> Result<Vec<Document>> {
        self.query_all(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE parent_id = ?1 ORDER BY id"),
            params![id.0],
        )
        .await
    }

    /// Root documents that have no summary yet.
    pub async fn list_unprocessed_roots(&self) -> Result<Vec<Document>> {
        self.query_all(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE parent_id IS NULL AND is_processed = 0 ORDER BY id"
            ),
            params![],
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Crawl job operations
    // -----------------------------------------------------------------------

    /// Insert a new crawl job. Returns the generated job ID.
    pub async fn insert_crawl_job(&self, root_url: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO crawl_jobs (id, root_url, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), root_url, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark a crawl job finished and attach its stats.
    pub async fn finish_crawl_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE crawl_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a crawl job by ID.
    pub async fn get_crawl_job(&self, job_id: &str) -> Result<Option<CrawlJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, root_url, started_at, finished_at, stats_json FROM crawl_jobs WHERE id = ?1",
                params![job_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(CrawlJob {
                id: row.get::<String>(0).map_err(storage_err)?,
                root_url: row.get::<String>(1).map_err(storage_err)?,
                started_at: row.get::<String>(2).map_err(storage_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            })),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Query helpers
    // -----------------------------------------------------------------------

    async fn query_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<Document>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    async fn query_all(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Document>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_document(&row)?);
        }
        Ok(results)
    }

    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }
}

/// Convert a database row (selected with [`DOCUMENT_COLUMNS`]) to a [`Document`].
fn row_to_document(row: &libsql::Row) -> Result<Document> {
    Ok(Document {
        id: DocumentId(row.get::<i64>(0).map_err(storage_err)?),
        url: row.get::<String>(1).map_err(storage_err)?,
        title: row.get::<String>(2).map_err(storage_err)?,
        content: row.get::<String>(3).map_err(storage_err)?,
        summary: row.get::<String>(4).ok(),
        parent_id: row.get::<i64>(5).ok().map(DocumentId),
        depth: row.get::<i64>(6).map_err(storage_err)? as u32,
        is_processed: row.get::<i64>(7).map_err(storage_err)? != 0,
        created_at: parse_timestamp(&row.get::<String>(8).map_err(storage_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(9).map_err(storage_err)?)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WikiDigestError::Storage(format!("invalid date: {e}")))
}
