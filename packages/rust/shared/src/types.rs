//! Core domain types for the WikiDigest document tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, WikiDigestError};

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// Row identifier of a persisted [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One crawled article, a node of the crawl tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Unique across the whole store.
    pub url: String,
    pub title: String,
    /// Extracted text, already cut to the content budget.
    pub content: String,
    /// Abstract produced lazily for roots; never written by the crawler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// The document that discovered this one; `None` for a crawl root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DocumentId>,
    /// Edge count from the root.
    pub depth: u32,
    /// Set once a summary has been stored.
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Whether this document is the root of a crawl tree.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Fields required to persist a new [`Document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub url: String,
    pub title: String,
    pub content: String,
    pub parent_id: Option<DocumentId>,
    pub depth: u32,
}

// ---------------------------------------------------------------------------
// SummaryView
// ---------------------------------------------------------------------------

/// What a `query` returns: the document, its abstract (if any), and its fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryView {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub children_count: u64,
}

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Parse a user-supplied URL, accepting only absolute http(s) URLs with a host.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| WikiDigestError::validation(format!("invalid URL '{raw}': {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(WikiDigestError::validation(format!(
            "unsupported URL scheme '{}' in '{raw}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(WikiDigestError::validation(format!("URL has no host: {raw}")));
    }

    Ok(url)
}
