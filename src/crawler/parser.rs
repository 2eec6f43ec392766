//! HTML parser for extracting text, metadata, links and resource references
//!
//! The same parser serves both fetch strategies: the static path feeds it the
//! response body and the rendered path feeds it the serialized DOM after
//! scripts ran.

use crate::resources::{ResourceKind, ResourceRef};
use crate::url::resolve;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Elements whose content never contributes to body text
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start a new line in the extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
];

/// Page-level metadata extracted alongside the text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub content_type: Option<String>,
    pub image_count: usize,
    pub link_count: usize,
    pub heading_count: usize,
    pub word_count: usize,

    /// Texts of h1-h3 headings in document order
    pub headings: Vec<String>,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from `<title>`, falling back to the first `<h1>`)
    pub title: Option<String>,

    /// Visible text with block boundaries kept as line breaks
    pub text: String,

    pub metadata: PageMetadata,

    /// Outbound page links (absolute, fragment-free, deduplicated)
    pub links: Vec<Url>,

    /// Referenced resources (absolute, deduplicated)
    pub resources: Vec<ResourceRef>,
}

/// Parses HTML content and extracts text, metadata, links and resources
///
/// # Link Extraction Rules
///
/// **Links:**
/// - `<a href="...">` whose target is not a known resource type
/// - `<link rel="canonical" href="...">`
///
/// **Resources:**
/// - `<img src>` and `<img data-src>` (lazy-loaded images)
/// - `<link rel="stylesheet" href>`
/// - `<script src>`
/// - `<video src>`, `<audio src>`, `<source src>`
/// - `<a href>` pointing at an image, document or media file
///
/// **Never followed:** `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only hrefs.
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links (the final URL after redirects)
///
/// # Example
///
/// ```
/// use sitesift::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><p>Hello</p><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = document_base(&document, base_url);

    let title = extract_title(&document);
    let text = extract_text(&document);
    let (links, resources) = extract_references(&document, &base_url);
    let metadata = extract_metadata(&document, &text);

    ParsedPage {
        title,
        text,
        metadata,
        links,
        resources,
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Honors `<base href>` when present
fn document_base(document: &Html, fallback: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| fallback.join(href.trim()).ok())
        })
        .unwrap_or_else(|| fallback.clone())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|css| {
        let sel = selector(css)?;
        document
            .select(&sel)
            .map(|element| collapse(&element.text().collect::<String>()))
            .find(|s| !s.is_empty())
    })
}

/// Extracts visible text, one line per block element
fn extract_text(document: &Html) -> String {
    let mut raw = String::new();
    let root = selector("body")
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());
    collect_text(root, &mut raw);

    raw.lines()
        .map(collapse)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn extract_metadata(document: &Html, text: &str) -> PageMetadata {
    let meta = |name: &str| -> Option<String> {
        let sel = selector(&format!("meta[name='{}' i]", name))?;
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .map(collapse)
            .find(|s| !s.is_empty())
    };

    let content_type = selector("meta[http-equiv='Content-Type' i]")
        .and_then(|sel| {
            document
                .select(&sel)
                .find_map(|el| el.value().attr("content").map(collapse))
        })
        .or_else(|| {
            selector("meta[charset]").and_then(|sel| {
                document
                    .select(&sel)
                    .find_map(|el| el.value().attr("charset"))
                    .map(|charset| format!("text/html; charset={}", charset.trim()))
            })
        });

    let language = selector("html[lang]").and_then(|sel| {
        document
            .select(&sel)
            .find_map(|el| el.value().attr("lang"))
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty())
    });

    let count = |css: &str| selector(css).map_or(0, |sel| document.select(&sel).count());

    let headings = selector("h1, h2, h3").map_or_else(Vec::new, |sel| {
        document
            .select(&sel)
            .map(|el| collapse(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .collect()
    });

    PageMetadata {
        description: meta("description"),
        keywords: meta("keywords"),
        language,
        author: meta("author"),
        content_type,
        image_count: count("img"),
        link_count: count("a[href]"),
        heading_count: count("h1, h2, h3, h4, h5, h6"),
        word_count: text.split_whitespace().count(),
        headings,
    }
}

/// Extracts page links and resource references
fn extract_references(document: &Html, base_url: &Url) -> (Vec<Url>, Vec<ResourceRef>) {
    let mut links = Vec::new();
    let mut seen_links = HashSet::new();
    let mut resources = Vec::new();
    let mut seen_resources = HashSet::new();

    let mut push_resource = |url: Url, kind: ResourceKind| {
        if seen_resources.insert(url.to_string()) {
            resources.push(ResourceRef { url, kind });
        }
    };

    if let Some(sel) = selector("a[href]") {
        for element in document.select(&sel) {
            let Some(url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve(href, base_url))
            else {
                continue;
            };

            if let Some(kind) = ResourceKind::from_url(&url) {
                push_resource(url, kind);
            } else if element.value().attr("download").is_none()
                && seen_links.insert(url.to_string())
            {
                links.push(url);
            }
        }
    }

    if let Some(sel) = selector("link[rel='canonical' i][href]") {
        for element in document.select(&sel) {
            if let Some(url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve(href, base_url))
            {
                if seen_links.insert(url.to_string()) {
                    links.push(url);
                }
            }
        }
    }

    let tagged: [(&str, &[&str], ResourceKind); 4] = [
        ("img", &["src", "data-src"], ResourceKind::Image),
        ("link[rel~='stylesheet' i]", &["href"], ResourceKind::Stylesheet),
        ("script[src]", &["src"], ResourceKind::Script),
        ("video, audio, source", &["src"], ResourceKind::Media),
    ];

    for (css, attrs, kind) in tagged {
        let Some(sel) = selector(css) else { continue };
        for element in document.select(&sel) {
            for attr in attrs {
                if let Some(url) = element
                    .value()
                    .attr(attr)
                    .and_then(|value| resolve(value, base_url))
                {
                    push_resource(url, kind);
                }
            }
        }
    }

    (links, resources)
}

/// Collapses runs of whitespace into single spaces and trims
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
