//! Depth- and fan-out-bounded traversal engine.
//!
//! The engine starts from a root URL and walks same-site article links depth
//! first, one page at a time. Every page that is fetched and parsed becomes a
//! [`Document`](wikidigest_shared::Document) whose parent is the page that
//! linked to it. Failures abort only the branch they happen in; they are logged
//! and collected in the [`CrawlReport`], never returned as errors.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use wikidigest_shared::{
    CrawlConfig, DocumentId, FailureKind, NewDocument, Result, VisitedScope, WikiDigestError,
};
use wikidigest_storage::{CreateOutcome, Storage};

use crate::article::{ArticleParser, ParsedArticle};
use crate::fetch::Fetcher;
use crate::visited::VisitedTracker;

// ---------------------------------------------------------------------------
// CrawlReport
// ---------------------------------------------------------------------------

/// Summary of one traversal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    /// Crawl job row recorded for root crawls.
    pub job_id: Option<String>,
    /// Document for the starting URL, if one was created or already stored.
    pub root: Option<DocumentId>,
    pub documents_created: usize,
    /// Frames resolved to an already stored document.
    pub documents_existing: usize,
    /// Frames dropped by the depth ceiling or the visited set.
    pub branches_skipped: usize,
    pub failures: Vec<BranchFailure>,
    pub duration: Duration,
}

/// A branch that was aborted by a fetch, parse, or storage error.
#[derive(Debug, Clone, Serialize)]
pub struct BranchFailure {
    pub url: String,
    pub depth: u32,
    pub kind: FailureKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Observer for traversal progress (spinners, counters).
pub trait CrawlProgress: Send + Sync {
    /// A new document was stored; `stored` counts documents created so far.
    fn document_stored(&self, _url: &str, _depth: u32, _stored: usize) {}

    fn branch_failed(&self, _url: &str, _error: &WikiDigestError) {}
}

/// Progress observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl CrawlProgress for SilentProgress {}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// One unit of pending work.
#[derive(Debug)]
struct Frame {
    url: String,
    parent: Option<DocumentId>,
    depth: u32,
}

/// What happened to a single frame.
enum Visit {
    Skipped,
    Existing(DocumentId),
    Created { id: DocumentId, links: Vec<String> },
    Failed(WikiDigestError),
}

/// Traversal engine holding the HTTP client, page parser, and visited set.
pub struct Crawler {
    config: CrawlConfig,
    fetcher: Fetcher,
    parser: ArticleParser,
    /// Instance-lifetime visited set, used when the scope is `Instance`.
    visited: VisitedTracker,
}

impl Crawler {
    /// Create a crawler. Fails on an invalid selector or HTTP client setup.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let parser = ArticleParser::new(&config)?;
        Ok(Self {
            config,
            fetcher: Fetcher::new()?,
            parser,
            visited: VisitedTracker::new(),
        })
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Number of URLs claimed by this instance's visited set.
    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Crawl a new tree rooted at `url` and record it as a crawl job.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn crawl(
        &self,
        url: &str,
        storage: &Storage,
        progress: &dyn CrawlProgress,
    ) -> CrawlReport {
        let job_id = match storage.insert_crawl_job(url).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to record crawl job");
                None
            }
        };

        info!(
            max_depth = self.config.max_depth,
            link_cap = self.config.link_cap,
            scope = ?self.config.visited_scope,
            "starting crawl"
        );

        let visited = self.tracker_for_run();
        let mut report = self.run(url, None, 0, &visited, storage, progress).await;
        report.job_id = job_id;

        if let Some(job_id) = &report.job_id {
            let stats = serde_json::json!({
                "status": if report.failures.is_empty() { "completed" } else { "completed_with_errors" },
                "root": report.root,
                "documents_created": report.documents_created,
                "documents_existing": report.documents_existing,
                "branches_skipped": report.branches_skipped,
                "failures": report.failures.len(),
                "duration_ms": report.duration.as_millis() as u64,
            });
            if let Err(e) = storage.finish_crawl_job(job_id, &stats.to_string()).await {
                warn!(job_id, error = %e, "failed to finish crawl job");
            }
        }

        info!(
            root = ?report.root,
            created = report.documents_created,
            existing = report.documents_existing,
            skipped = report.branches_skipped,
            failures = report.failures.len(),
            duration_ms = report.duration.as_millis(),
            "crawl completed"
        );

        report
    }

    /// Crawl the subtree starting at `url`, attached under `parent` at `depth`.
    ///
    /// No crawl job is recorded. `report.root` holds the document for `url`.
    #[instrument(skip_all, fields(url = %url, depth))]
    pub async fn crawl_branch(
        &self,
        url: &str,
        parent: Option<DocumentId>,
        depth: u32,
        storage: &Storage,
        progress: &dyn CrawlProgress,
    ) -> CrawlReport {
        let visited = self.tracker_for_run();
        self.run(url, parent, depth, &visited, storage, progress)
            .await
    }

    fn tracker_for_run(&self) -> VisitedTracker {
        match self.config.visited_scope {
            VisitedScope::Instance => self.visited.clone(),
            VisitedScope::PerCrawl => VisitedTracker::new(),
        }
    }

    /// Drain an explicit LIFO work list so each child's subtree finishes
    /// before its next sibling starts.
    async fn run(
        &self,
        url: &str,
        parent: Option<DocumentId>,
        depth: u32,
        visited: &VisitedTracker,
        storage: &Storage,
        progress: &dyn CrawlProgress,
    ) -> CrawlReport {
        let started = Instant::now();
        let mut report = CrawlReport::default();
        let mut stack = vec![Frame {
            url: url.to_string(),
            parent,
            depth,
        }];
        let mut is_entry = true;

        while let Some(frame) = stack.pop() {
            let resolved = match self.visit(&frame, visited, storage).await {
                Visit::Skipped => {
                    report.branches_skipped += 1;
                    None
                }
                Visit::Existing(id) => {
                    debug!(url = %frame.url, document_id = %id, "already stored");
                    report.documents_existing += 1;
                    Some(id)
                }
                Visit::Created { id, links } => {
                    report.documents_created += 1;
                    progress.document_stored(&frame.url, frame.depth, report.documents_created);
                    debug!(
                        url = %frame.url,
                        depth = frame.depth,
                        document_id = %id,
                        links = links.len(),
                        "document stored"
                    );

                    let children: Vec<Frame> = links
                        .into_iter()
                        .take(self.config.link_cap)
                        .map(|url| Frame {
                            url,
                            parent: Some(id),
                            depth: frame.depth + 1,
                        })
                        .collect();
                    stack.extend(children.into_iter().rev());
                    Some(id)
                }
                Visit::Failed(e) => {
                    warn!(url = %frame.url, depth = frame.depth, error = %e, "crawl branch aborted");
                    progress.branch_failed(&frame.url, &e);
                    report.failures.push(BranchFailure {
                        url: frame.url.clone(),
                        depth: frame.depth,
                        kind: e.failure_kind(),
                        message: e.to_string(),
                    });
                    None
                }
            };

            if is_entry {
                report.root = resolved;
                is_entry = false;
            }
        }

        report.duration = started.elapsed();
        report
    }

    async fn visit(&self, frame: &Frame, visited: &VisitedTracker, storage: &Storage) -> Visit {
        if frame.depth >= self.config.max_depth {
            return Visit::Skipped;
        }
        // Claimed before any I/O; a failed branch keeps its claim.
        if !visited.claim(&frame.url) {
            return Visit::Skipped;
        }

        match storage.get_by_url(&frame.url).await {
            Ok(Some(doc)) => return Visit::Existing(doc.id),
            Ok(None) => {}
            Err(e) => return Visit::Failed(e),
        }

        let body = match self.fetcher.fetch(&frame.url).await {
            Ok(body) => body,
            Err(e) => return Visit::Failed(e),
        };

        let expand = frame.depth + 1 < self.config.max_depth;
        let article = match self.parse(&frame.url, &body, expand.then_some(visited)) {
            Ok(article) => article,
            Err(e) => return Visit::Failed(e),
        };

        let new_doc = NewDocument {
            url: frame.url.clone(),
            title: article.title,
            content: article.content,
            parent_id: frame.parent,
            depth: frame.depth,
        };

        match storage.create(&new_doc).await {
            Ok(CreateOutcome::Created(id)) => Visit::Created {
                id,
                links: article.links,
            },
            // Lost a race with a concurrent crawl; that crawl owns the subtree.
            Ok(CreateOutcome::Existing(id)) => Visit::Existing(id),
            Err(e) => Visit::Failed(e),
        }
    }

    /// Parse synchronously so the DOM never lives across an await.
    fn parse(
        &self,
        url: &str,
        body: &str,
        follow: Option<&VisitedTracker>,
    ) -> Result<ParsedArticle> {
        let base = Url::parse(url).map_err(|e| WikiDigestError::parse(url, e.to_string()))?;
        self.parser.parse(body, &base, follow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn temp_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wd_crawl_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn config(max_depth: u32) -> CrawlConfig {
        CrawlConfig {
            max_depth,
            ..CrawlConfig::default()
        }
    }

    fn page(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|l| format!(r#"<p><a href="{l}">{l}</a></p>"#))
            .collect();
        format!(
            r#"<html><body>
                <h1 class="firstHeading">{title}</h1>
                <div id="mw-content-text"><p>About {title}.</p>{anchors}</div>
            </body></html>"#
        )
    }

    async fn serve(server: &MockServer, at: &str, body: String, times: u64) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(times)
            .mount(server)
            .await;
    }

    #[derive(Default)]
    struct RecordingProgress {
        stored: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
    }

    impl CrawlProgress for RecordingProgress {
        fn document_stored(&self, url: &str, _depth: u32, _stored: usize) {
            self.stored.lock().unwrap().push(url.to_string());
        }

        fn branch_failed(&self, url: &str, _error: &WikiDigestError) {
            self.failed.lock().unwrap().push(url.to_string());
        }
    }

    #[tokio::test]
    async fn depth_two_creates_root_and_children_only() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &["/wiki/A", "/wiki/B"]), 1).await;
        serve(&server, "/wiki/A", page("A", &["/wiki/Grand"]), 1).await;
        serve(&server, "/wiki/B", page("B", &[]), 1).await;
        serve(&server, "/wiki/Grand", page("Grand", &[]), 0).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(2)).unwrap();
        let root_url = format!("{}/wiki/Root", server.uri());
        let report = crawler.crawl(&root_url, &storage, &SilentProgress).await;

        assert_eq!(report.documents_created, 3);
        assert!(report.failures.is_empty());
        let root_id = report.root.expect("root stored");

        let root = storage.get_by_id(root_id).await.unwrap().unwrap();
        assert_eq!(root.depth, 0);
        assert!(root.parent_id.is_none());
        assert_eq!(root.title, "Root");

        let children = storage.list_children(root_id).await.unwrap();
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(child.depth, 1);
            assert_eq!(child.parent_id, Some(root_id));
            assert_eq!(storage.count_children(child.id).await.unwrap(), 0);
        }
        assert_eq!(storage.count_documents().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn root_fetch_failure_creates_nothing() {
        let server = MockServer::start().await;
        Mock::given(path("/wiki/Gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(3)).unwrap();
        let progress = RecordingProgress::default();
        let report = crawler
            .crawl(&format!("{}/wiki/Gone", server.uri()), &storage, &progress)
            .await;

        assert!(report.root.is_none());
        assert_eq!(report.documents_created, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Fetch);
        assert_eq!(progress.failed.lock().unwrap().len(), 1);
        assert_eq!(storage.count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn child_without_content_aborts_only_its_branch() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &["/wiki/Bad", "/wiki/Good"]), 1).await;
        serve(
            &server,
            "/wiki/Bad",
            "<html><body><h1 class=\"firstHeading\">Bad</h1><p>stub</p></body></html>".into(),
            1,
        )
        .await;
        serve(&server, "/wiki/Good", page("Good", &[]), 1).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(3)).unwrap();
        let report = crawler
            .crawl(&format!("{}/wiki/Root", server.uri()), &storage, &SilentProgress)
            .await;

        assert_eq!(report.documents_created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Parse);
        assert_eq!(report.failures[0].depth, 1);
        assert!(report.failures[0].url.ends_with("/wiki/Bad"));

        let bad = format!("{}/wiki/Bad", server.uri());
        assert!(!storage.exists_by_url(&bad).await.unwrap());
        let good = format!("{}/wiki/Good", server.uri());
        assert!(storage.exists_by_url(&good).await.unwrap());
    }

    #[tokio::test]
    async fn fan_out_is_capped_in_document_order() {
        let server = MockServer::start().await;
        let links = ["/wiki/L0", "/wiki/L1", "/wiki/L2", "/wiki/L3", "/wiki/L4"];
        serve(&server, "/wiki/Root", page("Root", &links), 1).await;
        for (i, link) in links.iter().enumerate() {
            let times = if i < 3 { 1 } else { 0 };
            serve(&server, link, page(link, &[]), times).await;
        }

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(2)).unwrap();
        let report = crawler
            .crawl(&format!("{}/wiki/Root", server.uri()), &storage, &SilentProgress)
            .await;

        let children = storage.list_children(report.root.unwrap()).await.unwrap();
        let urls: Vec<String> = children.into_iter().map(|d| d.url).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/wiki/L0", server.uri()),
                format!("{}/wiki/L1", server.uri()),
                format!("{}/wiki/L2", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn subtrees_complete_before_next_sibling() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &["/wiki/A", "/wiki/B"]), 1).await;
        serve(&server, "/wiki/A", page("A", &["/wiki/C"]), 1).await;
        serve(&server, "/wiki/B", page("B", &[]), 1).await;
        serve(&server, "/wiki/C", page("C", &[]), 1).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(3)).unwrap();
        let progress = RecordingProgress::default();
        crawler
            .crawl(&format!("{}/wiki/Root", server.uri()), &storage, &progress)
            .await;

        let order: Vec<String> = progress
            .stored
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(order, vec!["Root", "A", "C", "B"]);

        let c = storage
            .get_by_url(&format!("{}/wiki/C", server.uri()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.depth, 2);
        let a = storage.get_by_id(c.parent_id.unwrap()).await.unwrap().unwrap();
        assert!(a.url.ends_with("/wiki/A"));
        assert_eq!(a.depth, 1);
    }

    #[tokio::test]
    async fn cycles_are_claimed_once() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &["/wiki/Root", "/wiki/A"]), 1).await;
        serve(&server, "/wiki/A", page("A", &["/wiki/Root", "/wiki/A"]), 1).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(4)).unwrap();
        let report = crawler
            .crawl(&format!("{}/wiki/Root", server.uri()), &storage, &SilentProgress)
            .await;

        assert_eq!(report.documents_created, 2);
        assert!(report.failures.is_empty());
        assert_eq!(storage.count_documents().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn instance_scope_skips_urls_from_earlier_crawls() {
        let server = MockServer::start().await;
        Mock::given(path("/wiki/Flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(3)).unwrap();
        let url = format!("{}/wiki/Flaky", server.uri());

        let first = crawler.crawl(&url, &storage, &SilentProgress).await;
        assert_eq!(first.failures.len(), 1);

        // The failed URL stays claimed, so nothing is fetched again
        let second = crawler.crawl(&url, &storage, &SilentProgress).await;
        assert!(second.root.is_none());
        assert!(second.failures.is_empty());
        assert_eq!(second.branches_skipped, 1);
        assert_eq!(crawler.visited_len(), 1);
    }

    #[tokio::test]
    async fn per_crawl_scope_refetches_failed_urls() {
        let server = MockServer::start().await;
        Mock::given(path("/wiki/Flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(CrawlConfig {
            visited_scope: VisitedScope::PerCrawl,
            ..config(3)
        })
        .unwrap();
        let url = format!("{}/wiki/Flaky", server.uri());

        crawler.crawl(&url, &storage, &SilentProgress).await;
        let second = crawler.crawl(&url, &storage, &SilentProgress).await;
        assert_eq!(second.failures.len(), 1);
        assert_eq!(crawler.visited_len(), 0);
    }

    #[tokio::test]
    async fn stored_url_is_returned_without_fetching() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Known", page("Known", &["/wiki/X"]), 0).await;
        serve(&server, "/wiki/X", page("X", &[]), 0).await;

        let storage = temp_storage().await;
        let url = format!("{}/wiki/Known", server.uri());
        let existing = storage
            .create(&NewDocument {
                url: url.clone(),
                title: "Known".into(),
                content: "stored earlier".into(),
                parent_id: None,
                depth: 0,
            })
            .await
            .unwrap()
            .id();

        let crawler = Crawler::new(config(3)).unwrap();
        let report = crawler.crawl(&url, &storage, &SilentProgress).await;

        assert_eq!(report.root, Some(existing));
        assert_eq!(report.documents_existing, 1);
        assert_eq!(report.documents_created, 0);
    }

    #[tokio::test]
    async fn depth_ceiling_is_checked_first() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Deep", page("Deep", &[]), 0).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(2)).unwrap();
        let url = format!("{}/wiki/Deep", server.uri());
        let report = crawler
            .crawl_branch(&url, None, 2, &storage, &SilentProgress)
            .await;

        assert!(report.root.is_none());
        assert_eq!(report.branches_skipped, 1);
        // Not claimed, so a shallower crawl can still visit it
        assert_eq!(crawler.visited_len(), 0);
    }

    #[tokio::test]
    async fn max_depth_one_stores_root_only() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &["/wiki/A"]), 1).await;
        serve(&server, "/wiki/A", page("A", &[]), 0).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(1)).unwrap();
        let report = crawler
            .crawl(&format!("{}/wiki/Root", server.uri()), &storage, &SilentProgress)
            .await;

        assert_eq!(report.documents_created, 1);
        assert_eq!(report.branches_skipped, 0);
    }

    #[tokio::test]
    async fn crawl_job_is_recorded_with_stats() {
        let server = MockServer::start().await;
        serve(&server, "/wiki/Root", page("Root", &[]), 1).await;

        let storage = temp_storage().await;
        let crawler = Crawler::new(config(2)).unwrap();
        let url = format!("{}/wiki/Root", server.uri());
        let report = crawler.crawl(&url, &storage, &SilentProgress).await;

        let job_id = report.job_id.expect("job recorded");
        let job = storage.get_crawl_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.root_url, url);
        assert!(job.finished_at.is_some());

        let stats: serde_json::Value = serde_json::from_str(&job.stats_json.unwrap()).unwrap();
        assert_eq!(stats["status"], "completed");
        assert_eq!(stats["documents_created"], 1);
    }
}
