use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScrapedPage {
    pub url: String,
    pub final_url: String, // After redirects
    pub title: Option<String>,
    /// Visible text, whitespace collapsed and truncated.
    pub text: String,
    pub meta_image: Option<String>,
    /// `product:price:amount` style metadata, with currency when present.
    pub meta_price: Option<String>,
    pub response_time_ms: u64,
}

#[derive(Clone)]
pub struct WebScraper {
    client: Client,
    config: ScraperConfig,
}

impl WebScraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn fetch(&self, url: &str) -> Result<ScrapedPage> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Scraping(format!("HTTP {} fetching {}", status, url)));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;

        let mut page = parse_page(&body, self.config.max_page_chars);
        page.url = url.to_string();
        page.final_url = final_url;
        page.response_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::debug!(
            "Fetched {} ({} chars of text, {}ms)",
            url,
            page.text.len(),
            page.response_time_ms
        );
        Ok(page)
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    document
        .select(&selector(css))
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
    }
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull the text and metadata the extractor needs out of raw HTML.
pub fn parse_page(html: &str, max_chars: usize) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = meta_content(&document, r#"meta[property="og:title"]"#).or_else(|| {
        document
            .select(&selector("title"))
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let meta_image = meta_content(&document, r#"meta[property="og:image"]"#);

    let meta_price = meta_content(&document, r#"meta[property="product:price:amount"]"#)
        .or_else(|| meta_content(&document, r#"meta[property="og:price:amount"]"#))
        .or_else(|| meta_content(&document, r#"meta[itemprop="price"]"#))
        .map(|amount| {
            let currency = meta_content(&document, r#"meta[property="product:price:currency"]"#)
                .or_else(|| meta_content(&document, r#"meta[property="og:price:currency"]"#))
                .or_else(|| meta_content(&document, r#"meta[itemprop="priceCurrency"]"#));
            match currency {
                Some(currency) => format!("{} {}", amount, currency),
                None => amount,
            }
        });

    let text = document
        .select(&selector("body"))
        .next()
        .map(visible_text)
        .unwrap_or_default();
    let text = if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text
    };

    ScrapedPage {
        title,
        text,
        meta_image,
        meta_price,
        ..ScrapedPage::default()
    }
}
