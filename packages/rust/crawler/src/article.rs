//! Article parsing: title, boilerplate-free text, follow-up links.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use wikidigest_shared::{CrawlConfig, Result, WikiDigestError};

use crate::links::{LinkRules, extract_article_links};
use crate::visited::VisitedTracker;

/// Title used when the page has no heading.
const FALLBACK_TITLE: &str = "Untitled";

/// Elements whose text is never prose.
const NON_PROSE_TAGS: [&str; 2] = ["script", "style"];

/// Everything the traversal keeps from a fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    /// Boilerplate-free text, cut to the content budget.
    pub content: String,
    /// Follow-up candidates; empty unless links were requested.
    pub links: Vec<String>,
}

/// Pre-compiled selectors and limits for parsing article pages.
#[derive(Debug)]
pub struct ArticleParser {
    title: Selector,
    content: Selector,
    boilerplate_classes: Vec<String>,
    content_budget: usize,
    article_prefix: String,
    extractor_cap: usize,
}

impl ArticleParser {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            title: compile(&config.title_selector)?,
            content: compile(&config.content_selector)?,
            boilerplate_classes: config.boilerplate_classes.clone(),
            content_budget: config.content_budget,
            article_prefix: config.article_prefix.clone(),
            extractor_cap: config.extractor_cap,
        })
    }

    /// Parse a fetched page.
    ///
    /// When `follow` is given, article links are extracted too, filtered
    /// against that tracker. A page without the content region is a parse
    /// failure.
    pub fn parse(
        &self,
        html: &str,
        url: &Url,
        follow: Option<&VisitedTracker>,
    ) -> Result<ParsedArticle> {
        let doc = Html::parse_document(html);

        let region = doc.select(&self.content).next().ok_or_else(|| {
            WikiDigestError::parse(url.as_str(), "main content region not found")
        })?;

        let title = doc
            .select(&self.title)
            .next()
            .map(|el| join_text(el.text()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());

        let mut pieces = Vec::new();
        self.collect_text(region, &mut pieces);
        let content = truncate_chars(&pieces.join(" "), self.content_budget);

        let links = match follow {
            Some(visited) => {
                let rules = LinkRules {
                    article_prefix: &self.article_prefix,
                    cap: self.extractor_cap,
                };
                extract_article_links(&doc, url, &rules, visited)
            }
            None => Vec::new(),
        };

        Ok(ParsedArticle {
            title,
            content,
            links,
        })
    }

    /// Depth-first text collection that skips boilerplate subtrees.
    fn collect_text(&self, el: ElementRef<'_>, out: &mut Vec<String>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        out.push(trimmed.to_string());
                    }
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if !self.is_boilerplate(child_el) {
                            self.collect_text(child_el, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn is_boilerplate(&self, el: ElementRef<'_>) -> bool {
        let element = el.value();
        let name = element.name();

        if NON_PROSE_TAGS.contains(&name) {
            return true;
        }
        (name == "div" || name == "table")
            && element
                .classes()
                .any(|class| self.boilerplate_classes.iter().any(|b| b == class))
    }
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| WikiDigestError::config(format!("invalid CSS selector '{css}': {e:?}")))
}

fn join_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cut `text` to at most `budget` characters (not bytes).
fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
