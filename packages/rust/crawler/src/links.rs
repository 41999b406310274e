//! Same-site article link extraction.

use scraper::{Html, Selector};
use url::Url;

use crate::visited::VisitedTracker;

/// Rules for picking follow-up article links out of a page.
#[derive(Debug, Clone)]
pub struct LinkRules<'a> {
    /// Site-relative prefix an `href` must start with (e.g. `/wiki/`).
    pub article_prefix: &'a str,
    /// Maximum number of links returned.
    pub cap: usize,
}

/// Collect article links from `doc` in document order.
///
/// An anchor qualifies when its raw `href` starts with the article prefix and
/// contains neither `:` (namespaced pages) nor `#` (fragments). Qualifying
/// hrefs are resolved against the origin of `base_url`; any already in
/// `visited` are dropped. Repeated targets are not collapsed.
pub fn extract_article_links(
    doc: &Html,
    base_url: &Url,
    rules: &LinkRules<'_>,
    visited: &VisitedTracker,
) -> Vec<String> {
    let anchor_sel = Selector::parse("a[href]").expect("static selector is valid");

    doc.select(&anchor_sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| is_article_href(href, rules.article_prefix))
        .filter_map(|href| base_url.join(href).ok())
        .map(|resolved| resolved.to_string())
        .filter(|url| !visited.contains(url))
        .take(rules.cap)
        .collect()
}

fn is_article_href(href: &str, prefix: &str) -> bool {
    href.starts_with(prefix) && !href.contains(':') && !href.contains('#')
}
