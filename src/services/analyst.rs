use serde::Deserialize;
use serde_json::json;

use crate::error::GatewayError;

/// Optional AI commentary on top of the market data, spoken through any
/// OpenAI-compatible chat completions endpoint. Constructed only when an
/// API key is configured; the metered endpoint works without it.
pub struct AnalystService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl AnalystService {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub async fn trading_signal(&self, symbol: &str, price: &str) -> Result<String, GatewayError> {
        let prompt = format!(
            "The current price of {} is ${}. Give me a sarcastic trading signal.",
            symbol, price
        );
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider {
                detail: format!("signal api request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider {
                detail: format!("signal api returned {}", response.status()),
            });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|e| GatewayError::Provider {
                detail: format!("signal api returned invalid JSON: {}", e),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Provider {
                detail: "signal api returned no choices".to_string(),
            })
    }
}
