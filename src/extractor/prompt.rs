use serde_json::Value;

use crate::scraper::ScrapedPage;
use crate::utils::error::{AppError, Result};

/// Fields the model is asked for. Every field is optional: models answer
/// `null` when the page doesn't show a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmProductInfo {
    pub name: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
}

pub fn build_extraction_prompt(page: &ScrapedPage) -> String {
    let mut prompt = String::from(
        "Extract the product shown on this e-commerce page.\n\
         Respond with JSON only, using exactly these keys:\n\
         {\"name\": string, \"price\": string, \"imageUrl\": string}\n\
         Rules:\n\
         - \"price\" is the current selling price exactly as displayed, including the currency symbol or code.\n\
         - If the page shows a sale price and an original price, use the sale price.\n\
         - Use null for anything the page does not show. Never guess a price.\n\n",
    );

    prompt.push_str(&format!("URL: {}\n", page.final_url));
    if let Some(title) = &page.title {
        prompt.push_str(&format!("Page title: {}\n", title));
    }
    if let Some(price) = &page.meta_price {
        prompt.push_str(&format!("Price metadata: {}\n", price));
    }
    if let Some(image) = &page.meta_image {
        prompt.push_str(&format!("Image metadata: {}\n", image));
    }
    prompt.push_str("\nPage text:\n");
    prompt.push_str(&page.text);
    prompt
}

fn field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    let value = keys.iter().find_map(|key| object.get(*key))?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_ascii_lowercase().as_str() {
        "" | "null" | "none" | "n/a" | "unknown" => None,
        _ => Some(text),
    }
}

/// Parse the model's answer. Tolerates markdown code fences and prose around
/// the JSON object.
pub fn parse_extraction_response(raw: &str) -> Result<LlmProductInfo> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(AppError::Parse {
                message: format!("No JSON object in model response: {}", raw.trim()),
            });
        }
    };

    let value: Value = serde_json::from_str(json).map_err(|e| AppError::Parse {
        message: format!("Invalid JSON in model response: {}", e),
    })?;
    let object = value.as_object().ok_or_else(|| AppError::Parse {
        message: "Model response is not a JSON object".to_string(),
    })?;

    Ok(LlmProductInfo {
        name: field(object, &["name", "productName", "title"]),
        price: field(object, &["price", "currentPrice"]),
        image_url: field(object, &["imageUrl", "image_url", "image"]),
    })
}
