//! Shared types, error model, and configuration for WikiDigest.
//!
//! This crate is the foundation depended on by all other WikiDigest crates.
//! It provides:
//! - [`WikiDigestError`]: the unified error type
//! - Domain types ([`Document`], [`DocumentId`], [`NewDocument`], [`SummaryView`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSection, ServerConfig, StorageConfig, SummarizerConfig,
    VisitedScope, config_dir, config_file_path, database_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{FailureKind, Result, WikiDigestError};
pub use types::{Document, DocumentId, NewDocument, SummaryView, parse_http_url};
