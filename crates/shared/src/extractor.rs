use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Stored article text is capped at this many characters.
pub const MAX_STORED_TEXT_CHARS: usize = 20_000;

/// A strategy must produce at least this much trimmed text to be accepted.
pub const MIN_ARTICLE_CHARS: usize = 100;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const ARTICLE_SELECTOR: &str =
    "article p, main p, [itemprop=\"articleBody\"] p, [role=\"main\"] p";

const BOILERPLATE_TAGS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Main text of the page at `url`, or an empty string when unavailable.
    async fn fetch_text(&self, url: &str) -> String;
}

/// Ways of pulling readable text out of a page, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Paragraphs inside the page's article/main container
    ArticleBody,
    /// Every paragraph outside navigation and boilerplate
    Paragraphs,
    /// Whole-document HTML-to-text rendering
    PlainText,
}

impl ExtractionStrategy {
    pub const ORDERED: [ExtractionStrategy; 3] = [
        ExtractionStrategy::ArticleBody,
        ExtractionStrategy::Paragraphs,
        ExtractionStrategy::PlainText,
    ];

    pub fn extract(&self, html: &str) -> String {
        match self {
            ExtractionStrategy::ArticleBody => article_body(html),
            ExtractionStrategy::Paragraphs => paragraphs(html),
            ExtractionStrategy::PlainText => plain_text(html),
        }
    }
}

/// Run the strategies in order and keep the first one with enough text.
pub fn extract_text(html: &str) -> Option<(ExtractionStrategy, String)> {
    ExtractionStrategy::ORDERED.iter().find_map(|strategy| {
        let text = strategy.extract(html);
        let text = text.trim();
        if text.chars().count() >= MIN_ARTICLE_CHARS {
            Some((*strategy, text.to_string()))
        } else {
            debug!(?strategy, chars = text.chars().count(), "Extraction strategy yielded too little text");
            None
        }
    })
}

/// Render an HTML fragment (such as a self-post body) as single-spaced
/// plain text. Line wrapping from the renderer must not split phrases.
pub fn html_fragment_to_text(html: &str) -> String {
    plain_text(html)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cut `text` to at most `max` characters, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

fn article_body(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(ARTICLE_SELECTOR) else {
        return String::new();
    };

    join_paragraphs(document.select(&selector))
}

fn paragraphs(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };

    join_paragraphs(
        document
            .select(&selector)
            .filter(|p| !inside_boilerplate(p)),
    )
}

fn plain_text(html: &str) -> String {
    html2text::config::plain()
        .string_from_read(html.as_bytes(), 100)
        .unwrap_or_default()
}

fn inside_boilerplate(element: &ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| BOILERPLATE_TAGS.contains(&e.name()))
    })
}

fn join_paragraphs<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> String {
    elements
        .map(|p| {
            p.text()
                .collect::<Vec<_>>()
                .join("")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ContentExtractor {
    client: Client,
}

impl ContentExtractor {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch and extract; any failure degrades to an empty string.
    pub async fn fetch_article_text(&self, url: &str) -> String {
        match self.try_fetch_html(url).await {
            Ok(Some(html)) => match extract_text(&html) {
                Some((strategy, text)) => {
                    debug!(%url, ?strategy, chars = text.chars().count(), "Extracted article text");
                    truncate_chars(&text, MAX_STORED_TEXT_CHARS)
                }
                None => {
                    warn!(%url, "No extraction strategy produced enough text");
                    String::new()
                }
            },
            Ok(None) => {
                warn!(%url, "Article unavailable");
                String::new()
            }
            Err(e) => {
                warn!(%url, error = %e, "Failed to fetch article");
                String::new()
            }
        }
    }

    async fn try_fetch_html(&self, url: &str) -> Result<Option<String>> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported URL scheme: {}", parsed.scheme());
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .context("Failed to send HTTP request")?;

        let status = response.status();
        if status == 401 || status == 403 || status == 404 {
            return Ok(None);
        }

        if !status.is_success() {
            anyhow::bail!("HTTP error: {}", status);
        }

        let html = response.text().await.context("Failed to read response body")?;

        Ok(Some(html))
    }
}

#[async_trait]
impl ArticleFetcher for ContentExtractor {
    async fn fetch_text(&self, url: &str) -> String {
        self.fetch_article_text(url).await
    }
}
