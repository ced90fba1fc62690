//! Product extraction: fetch a page and ask the LLM what the product costs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{LlmConfig, ScraperConfig};
use crate::scraper::{ScrapedPage, WebScraper};
use crate::utils::error::{AppError, Result};

pub mod llm;
pub mod prompt;

pub use llm::LlmClient;
pub use prompt::{build_extraction_prompt, parse_extraction_response, LlmProductInfo};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedProduct {
    pub name: String,
    /// Current price as displayed; `None` when the page shows no price.
    pub price: Option<String>,
    pub image_url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedProduct>;
}

pub struct LlmExtractor {
    scraper: WebScraper,
    llm: LlmClient,
}

impl LlmExtractor {
    pub fn new(scraper: WebScraper, llm: LlmClient) -> Self {
        Self { scraper, llm }
    }

    pub fn from_config(scraper_config: ScraperConfig, llm_config: LlmConfig) -> Result<Self> {
        Ok(Self::new(WebScraper::new(scraper_config)?, LlmClient::new(llm_config)?))
    }

    async fn ask_model(&self, page: &ScrapedPage) -> Result<LlmProductInfo> {
        let prompt = build_extraction_prompt(page);
        let answer = self.llm.complete(&prompt).await?;
        parse_extraction_response(&answer)
    }
}

/// Make relative image URLs absolute against the page URL.
fn resolve_image(page_url: &str, image: &str) -> Option<String> {
    match Url::parse(image) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url)
            .and_then(|base| base.join(image))
            .ok()
            .map(|url| url.to_string()),
        Err(_) => None,
    }
}

fn fallback_name(page: &ScrapedPage) -> String {
    Url::parse(&page.final_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| page.url.clone())
}

/// Combine the model's answer with page metadata. The model wins where it
/// answered; metadata fills the gaps.
pub fn merge_extraction(page: &ScrapedPage, info: LlmProductInfo) -> ExtractedProduct {
    let name = info
        .name
        .or_else(|| page.title.clone())
        .unwrap_or_else(|| fallback_name(page));

    let image_url = info
        .image_url
        .or_else(|| page.meta_image.clone())
        .and_then(|image| resolve_image(&page.final_url, &image));

    ExtractedProduct {
        name,
        price: info.price.or_else(|| page.meta_price.clone()),
        image_url,
    }
}

#[async_trait]
impl PriceExtractor for LlmExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedProduct> {
        let page = self.scraper.fetch(url).await?;
        if page.text.is_empty() && page.meta_price.is_none() {
            return Err(AppError::Extraction(format!("No readable content at {}", url)));
        }

        let info = match self.ask_model(&page).await {
            Ok(info) => info,
            // Structured price metadata is good enough when the model is unavailable
            Err(e) if page.meta_price.is_some() => {
                tracing::warn!("LLM extraction failed for {}, using page metadata: {}", url, e);
                LlmProductInfo::default()
            }
            Err(e) => return Err(e),
        };

        let product = merge_extraction(&page, info);
        tracing::debug!("Extracted {:?} from {}", product.price, url);
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> ScrapedPage {
        ScrapedPage {
            url: "https://shop.example/p/1".to_string(),
            final_url: "https://shop.example/p/1".to_string(),
            title: Some("Page Title".to_string()),
            text: "some text".to_string(),
            meta_image: Some("/img/p1.jpg".to_string()),
            meta_price: Some("19.99 USD".to_string()),
            response_time_ms: 0,
        }
    }

    #[test]
    fn test_merge_prefers_model_answer() {
        let info = LlmProductInfo {
            name: Some("Model Name".to_string()),
            price: Some("$18.99".to_string()),
            image_url: Some("https://cdn.example/a.jpg".to_string()),
        };

        let product = merge_extraction(&page(), info);
        assert_eq!(product.name, "Model Name");
        assert_eq!(product.price.as_deref(), Some("$18.99"));
        assert_eq!(product.image_url.as_deref(), Some("https://cdn.example/a.jpg"));
    }

    #[test]
    fn test_merge_falls_back_to_metadata() {
        let product = merge_extraction(&page(), LlmProductInfo::default());
        assert_eq!(product.name, "Page Title");
        assert_eq!(product.price.as_deref(), Some("19.99 USD"));
        assert_eq!(product.image_url.as_deref(), Some("https://shop.example/img/p1.jpg"));
    }

    #[test]
    fn test_merge_uses_host_when_nothing_else() {
        let mut bare = page();
        bare.title = None;
        bare.meta_image = None;
        bare.meta_price = None;

        let product = merge_extraction(&bare, LlmProductInfo::default());
        assert_eq!(product.name, "shop.example");
        assert!(product.price.is_none());
        assert!(product.image_url.is_none());
    }

    #[tokio::test]
    async fn test_mock_extractor() {
        let mut mock = MockPriceExtractor::new();
        mock.expect_extract().returning(|url| {
            Ok(ExtractedProduct {
                name: url.to_string(),
                price: Some("$1".to_string()),
                image_url: None,
            })
        });

        let product = mock.extract("https://shop.example/p/1").await.unwrap();
        assert_eq!(product.name, "https://shop.example/p/1");
    }
}
