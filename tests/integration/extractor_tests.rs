use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pricewatch::config::{LlmConfig, LlmProvider, ScraperConfig};
use pricewatch::extractor::{LlmExtractor, PriceExtractor};
use pricewatch::AppError;

const PRODUCT_PAGE: &str = r#"
<html>
<head>
    <title>Trail Shoes | Example Outdoor</title>
    <meta property="og:image" content="/images/trail-shoes.jpg">
    <meta property="product:price:amount" content="119.95">
    <meta property="product:price:currency" content="EUR">
</head>
<body>
    <h1>Trail Shoes</h1>
    <p class="price"><s>€149,95</s> €119,95</p>
</body>
</html>
"#;

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::Openai,
        api_key: Some("test-key".to_string()),
        model: "gpt-test".to_string(),
        base_url: Some(server.uri()),
        request_timeout: 5,
        retry_attempts: 1,
        retry_delay_ms: 0,
        temperature: 0.0,
    }
}

async fn shop_server() -> MockServer {
    let shop = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/trail-shoes"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PRODUCT_PAGE, "text/html"))
        .mount(&shop)
        .await;
    shop
}

#[tokio::test]
async fn test_llm_extraction_end_to_end() -> anyhow::Result<()> {
    let shop = shop_server().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "```json\n{\"name\": \"Trail Shoes\", \"price\": \"€119,95\", \"imageUrl\": null}\n```"
                }
            }]
        })))
        .expect(1)
        .mount(&llm)
        .await;

    let extractor = LlmExtractor::from_config(ScraperConfig::default(), llm_config(&llm))?;
    let product = extractor.extract(&format!("{}/p/trail-shoes", shop.uri())).await?;

    assert_eq!(product.name, "Trail Shoes");
    assert_eq!(product.price.as_deref(), Some("€119,95"));
    // Relative og:image resolved against the page
    assert_eq!(
        product.image_url,
        Some(format!("{}/images/trail-shoes.jpg", shop.uri()))
    );

    Ok(())
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_price_metadata() -> anyhow::Result<()> {
    let shop = shop_server().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid API key" }
        })))
        .mount(&llm)
        .await;

    let extractor = LlmExtractor::from_config(ScraperConfig::default(), llm_config(&llm))?;
    let product = extractor.extract(&format!("{}/p/trail-shoes", shop.uri())).await?;

    assert_eq!(product.name, "Trail Shoes | Example Outdoor");
    assert_eq!(product.price.as_deref(), Some("119.95 EUR"));

    Ok(())
}

#[tokio::test]
async fn test_missing_page_is_an_error() -> anyhow::Result<()> {
    let shop = MockServer::start().await;
    let llm = MockServer::start().await;

    let extractor = LlmExtractor::from_config(ScraperConfig::default(), llm_config(&llm))?;
    let result = extractor.extract(&format!("{}/p/gone", shop.uri())).await;

    assert!(matches!(result, Err(AppError::Scraping(_))));
    Ok(())
}
