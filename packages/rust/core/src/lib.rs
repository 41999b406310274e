//! Service layer for WikiDigest.
//!
//! Ties the crawler, the document store, and the summarization model together
//! behind [`DigestService`], and exposes it over HTTP via [`api`].

pub mod api;
pub mod service;
pub mod summary;

pub use service::{DigestService, SubmitTicket};
pub use summary::Summarizer;
