use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::model::Order;

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("insight request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("insight provider answered with status {0}")]
    Rejected(u16),

    #[error("insight response had no text")]
    EmptyResponse,
}

/// Generative text used by the manager screens. Callers treat every error as
/// "no insight available".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn analyze_sales_trends(&self, orders: &[Order]) -> Result<String, InsightError>;

    async fn generate_product_description(&self, name: &str, category: &str) -> Result<String, InsightError>;
}

/// Provider used when nothing is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopInsightProvider;

#[async_trait]
impl InsightProvider for NoopInsightProvider {
    async fn analyze_sales_trends(&self, _orders: &[Order]) -> Result<String, InsightError> {
        Ok(String::new())
    }

    async fn generate_product_description(&self, _name: &str, _category: &str) -> Result<String, InsightError> {
        Ok(String::new())
    }
}

fn sales_prompt(orders: &[Order]) -> String {
    let summary: Vec<Value> = orders
        .iter()
        .map(|order| {
            json!({
                "date": order.date.format("%Y-%m-%d").to_string(),
                "total": order.total,
                "status": order.status.to_string(),
                "items": order.items.iter().map(|item| item.product.name.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();
    format!(
        "Analyze this grocery store sales data and give three short, actionable insights \
         for the store manager in under 80 words:\n{}",
        Value::Array(summary)
    )
}

/// Client for a Gemini-style `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct HttpInsightProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpInsightProvider {
    pub fn new(endpoint: String, model: String, api_key: String, timeout: Duration) -> Result<Self, InsightError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
        })
    }

    async fn generate(&self, prompt: String) -> Result<String, InsightError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint.trim_end_matches('/'), self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(InsightError::Rejected(response.status().as_u16()));
        }

        let value: Value = response.json().await?;
        let text = extract_text(&value).ok_or(InsightError::EmptyResponse)?;
        debug!(model = %self.model, "Received {} characters of generated text", text.len());
        Ok(text)
    }
}

fn extract_text(value: &Value) -> Option<String> {
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[async_trait]
impl InsightProvider for HttpInsightProvider {
    async fn analyze_sales_trends(&self, orders: &[Order]) -> Result<String, InsightError> {
        self.generate(sales_prompt(orders)).await
    }

    async fn generate_product_description(&self, name: &str, category: &str) -> Result<String, InsightError> {
        self.generate(format!(
            "Write a catchy, appetizing product description of at most two sentences for \"{}\" in the {} category of a grocery store.",
            name, category
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_reads_first_candidate() {
        let value = json!({
            "candidates": [{ "content": { "parts": [{ "text": "  Bananas sell best on weekends. " }] } }]
        });
        assert_eq!(extract_text(&value).as_deref(), Some("Bananas sell best on weekends."));
    }

    #[test]
    fn test_extract_text_rejects_missing_or_blank() {
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": " " }] } }] });
        assert_eq!(extract_text(&blank), None);
    }

    #[tokio::test]
    async fn test_noop_provider_returns_empty_text() {
        let provider = NoopInsightProvider;
        assert_eq!(provider.analyze_sales_trends(&[]).await.unwrap(), "");
        assert_eq!(provider.generate_product_description("Tea", "Drinks").await.unwrap(), "");
    }
}
