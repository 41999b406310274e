//! Entry-point service: schedule crawls and answer summary queries.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use wikidigest_crawler::{CrawlProgress, CrawlReport, Crawler, SilentProgress};
use wikidigest_shared::{Result, SummaryView, WikiDigestError, parse_http_url};
use wikidigest_storage::Storage;

use crate::summary::Summarizer;

/// A crawl accepted by [`DigestService::submit`].
#[derive(Debug)]
pub struct SubmitTicket {
    /// Normalised URL the crawl was started with.
    pub url: String,
    /// Completes with the crawl report; dropping it detaches the crawl.
    pub handle: JoinHandle<CrawlReport>,
}

/// Shared handle over the crawler, the store, and the summarizer.
#[derive(Clone)]
pub struct DigestService {
    crawler: Arc<Crawler>,
    storage: Arc<Storage>,
    summarizer: Arc<Summarizer>,
}

impl DigestService {
    pub fn new(crawler: Crawler, storage: Storage, summarizer: Summarizer) -> Self {
        Self {
            crawler: Arc::new(crawler),
            storage: Arc::new(storage),
            summarizer: Arc::new(summarizer),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Start a background crawl and return at once.
    ///
    /// Only URL validation can fail; the crawl outcome is available through
    /// the ticket's handle and is never reported to the caller otherwise.
    pub fn submit(&self, raw_url: &str) -> Result<SubmitTicket> {
        let url = parse_http_url(raw_url)?.to_string();

        let crawler = Arc::clone(&self.crawler);
        let storage = Arc::clone(&self.storage);
        let target = url.clone();
        let handle = tokio::spawn(async move {
            crawler.crawl(&target, &storage, &SilentProgress).await
        });

        info!(url = %url, "crawl scheduled");
        Ok(SubmitTicket { url, handle })
    }

    /// Crawl in the foreground, reporting progress as documents are stored.
    pub async fn crawl_now(
        &self,
        raw_url: &str,
        progress: &dyn CrawlProgress,
    ) -> Result<CrawlReport> {
        let url = parse_http_url(raw_url)?.to_string();
        Ok(self.crawler.crawl(&url, &self.storage, progress).await)
    }

    /// Look up a document, summarising it first if it is a root without one.
    #[instrument(skip(self))]
    pub async fn query(&self, raw_url: &str) -> Result<SummaryView> {
        let url = parse_http_url(raw_url)?.to_string();
        let doc = self
            .storage
            .get_by_url(&url)
            .await?
            .ok_or_else(|| WikiDigestError::NotFound { url: url.clone() })?;

        let mut summary = doc.summary.clone();
        if doc.is_root() && summary.is_none() {
            if let Some(text) = self
                .summarizer
                .generate_summary(&doc.title, &doc.content)
                .await
            {
                self.storage.update_summary(doc.id, &text).await?;
                summary = Some(text);
            }
        }

        let children_count = self.storage.count_children(doc.id).await?;
        Ok(SummaryView {
            url: doc.url,
            title: doc.title,
            summary,
            children_count,
        })
    }

    /// Summarise every root still lacking an abstract. Returns how many succeeded.
    pub async fn summarize_pending(&self) -> Result<usize> {
        let roots = self.storage.list_unprocessed_roots().await?;
        let total = roots.len();
        let mut done = 0;

        for doc in roots {
            match self
                .summarizer
                .generate_summary(&doc.title, &doc.content)
                .await
            {
                Some(text) => {
                    self.storage.update_summary(doc.id, &text).await?;
                    done += 1;
                }
                None => warn!(url = %doc.url, "no summary produced"),
            }
        }

        info!(done, total, "pending summaries processed");
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wikidigest_shared::{CrawlConfig, NewDocument, SummarizerConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn temp_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wd_service_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn llm_mock(server: &MockServer, text: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": text } }]
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    fn service(storage: Storage, llm: &MockServer) -> DigestService {
        let config = SummarizerConfig {
            api_url: format!("{}/v1/chat/completions", llm.uri()),
            ..SummarizerConfig::default()
        };
        let summarizer = Summarizer::new(&config, Some("test-key".into())).unwrap();
        let crawler = Crawler::new(CrawlConfig::default()).unwrap();
        DigestService::new(crawler, storage, summarizer)
    }

    async fn seed_tree(storage: &Storage) -> (String, String) {
        let root_url = "https://en.wikipedia.org/wiki/Rust".to_string();
        let child_url = "https://en.wikipedia.org/wiki/Cargo".to_string();
        let root = storage
            .create(&NewDocument {
                url: root_url.clone(),
                title: "Rust".into(),
                content: "Rust is a systems language.".into(),
                parent_id: None,
                depth: 0,
            })
            .await
            .unwrap()
            .id();
        storage
            .create(&NewDocument {
                url: child_url.clone(),
                title: "Cargo".into(),
                content: "Cargo is the package manager.".into(),
                parent_id: Some(root),
                depth: 1,
            })
            .await
            .unwrap();
        (root_url, child_url)
    }

    #[tokio::test]
    async fn root_is_summarised_once() {
        let llm = MockServer::start().await;
        llm_mock(&llm, "Rust is fast and safe.", 1).await;

        let storage = temp_storage().await;
        let (root_url, _) = seed_tree(&storage).await;
        let service = service(storage, &llm);

        let first = service.query(&root_url).await.unwrap();
        assert_eq!(first.summary.as_deref(), Some("Rust is fast and safe."));
        assert_eq!(first.children_count, 1);
        assert_eq!(first.title, "Rust");

        let second = service.query(&root_url).await.unwrap();
        assert_eq!(second, first);

        let stored = service.storage().get_by_url(&root_url).await.unwrap().unwrap();
        assert!(stored.is_processed);
    }

    #[tokio::test]
    async fn child_is_never_summarised() {
        let llm = MockServer::start().await;
        llm_mock(&llm, "unused", 0).await;

        let storage = temp_storage().await;
        let (_, child_url) = seed_tree(&storage).await;
        let service = service(storage, &llm);

        let view = service.query(&child_url).await.unwrap();
        assert!(view.summary.is_none());
        assert_eq!(view.children_count, 0);
    }

    #[tokio::test]
    async fn failed_summary_leaves_root_unprocessed() {
        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&llm)
            .await;

        let storage = temp_storage().await;
        let (root_url, _) = seed_tree(&storage).await;
        let service = service(storage, &llm);

        assert!(service.query(&root_url).await.unwrap().summary.is_none());
        // Still pending, so the next query tries again
        assert!(service.query(&root_url).await.unwrap().summary.is_none());
        let stored = service.storage().get_by_url(&root_url).await.unwrap().unwrap();
        assert!(!stored.is_processed);
    }

    #[tokio::test]
    async fn unknown_url_is_not_found() {
        let llm = MockServer::start().await;
        let service = service(temp_storage().await, &llm);

        let err = service
            .query("https://en.wikipedia.org/wiki/Nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiDigestError::NotFound { .. }));
    }

    #[tokio::test]
    async fn submit_rejects_invalid_urls() {
        let llm = MockServer::start().await;
        let service = service(temp_storage().await, &llm);

        assert!(matches!(
            service.submit("not a url"),
            Err(WikiDigestError::Validation { .. })
        ));
        assert!(matches!(
            service.submit("ftp://en.wikipedia.org/wiki/Rust"),
            Err(WikiDigestError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn submit_returns_before_crawl_completes() {
        let wiki = MockServer::start().await;
        Mock::given(path("/wiki/Root"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        r#"<h1 class="firstHeading">Root</h1><div id="mw-content-text"><p>Body</p></div>"#,
                    )
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&wiki)
            .await;
        let llm = MockServer::start().await;
        let service = service(temp_storage().await, &llm);

        let ticket = service.submit(&format!("{}/wiki/Root", wiki.uri())).unwrap();
        assert!(!ticket.handle.is_finished());
        assert!(!service.storage().exists_by_url(&ticket.url).await.unwrap());

        let report = ticket.handle.await.unwrap();
        assert!(report.root.is_some());
        assert!(service.storage().exists_by_url(&ticket.url).await.unwrap());
    }

    #[tokio::test]
    async fn summarize_pending_covers_all_roots() {
        let llm = MockServer::start().await;
        llm_mock(&llm, "Short abstract.", 2).await;

        let storage = temp_storage().await;
        seed_tree(&storage).await;
        storage
            .create(&NewDocument {
                url: "https://en.wikipedia.org/wiki/LLVM".into(),
                title: "LLVM".into(),
                content: "LLVM is a compiler toolkit.".into(),
                parent_id: None,
                depth: 0,
            })
            .await
            .unwrap();
        let service = service(storage, &llm);

        assert_eq!(service.summarize_pending().await.unwrap(), 2);
        assert!(service.storage().list_unprocessed_roots().await.unwrap().is_empty());
        assert_eq!(service.summarize_pending().await.unwrap(), 0);
    }
}
