//! Bounded recursive crawler for wiki-style article sites.
//!
//! This crate provides:
//! - [`fetch`]: single-GET page fetcher
//! - [`article`]: title and boilerplate-free text extraction
//! - [`links`]: same-site article link extraction
//! - [`visited`]: shared visited-URL set
//! - [`engine`]: depth-first traversal that builds the document tree

pub mod article;
pub mod engine;
pub mod fetch;
pub mod links;
pub mod visited;

pub use article::{ArticleParser, ParsedArticle};
pub use engine::{BranchFailure, CrawlProgress, CrawlReport, Crawler, SilentProgress};
pub use fetch::Fetcher;
pub use links::{LinkRules, extract_article_links};
pub use visited::VisitedTracker;
