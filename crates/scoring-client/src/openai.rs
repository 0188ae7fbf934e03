use crate::error::{ScoringError, ScoringResult};
use crate::ScoringFunction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-nano-2025-08-07";

const SYSTEM_RUBRIC: &str = "You are a rigorous, data-driven equity analyst. \
Score the investment quality of the stock from 0 to 100 using only the supplied data: \
profitability and margins, growth and stability, valuation, balance sheet and risk, \
analyst and news signals, and macroeconomic conditions. \
0-20 avoid, 21-40 weak, 41-60 mixed, 61-80 strong, 81-100 exceptional. \
Be concise and cite concrete figures from the input. \
Answer with JSON only: {\"score\": integer, \"summary\": string, \"positives\": [string], \"negatives\": [string]}.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "stock_score",
            "schema": {
                "type": "object",
                "properties": {
                    "score": {"type": "integer"},
                    "summary": {"type": "string"},
                    "positives": {"type": "array", "items": {"type": "string"}},
                    "negatives": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["score", "summary"]
            }
        }
    })
}

/// Scoring function backed by an OpenAI-compatible chat completions API
#[derive(Clone)]
pub struct OpenAiScorer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiScorer {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> ScoringResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl ScoringFunction for OpenAiScorer {
    async fn score_payload(&self, payload: &str) -> ScoringResult<String> {
        if self.api_key.is_empty() {
            return Err(ScoringError::ServiceUnavailable(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let user_content = format!("Stock data (JSON, possibly truncated):\n{}", payload);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_RUBRIC,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            response_format: response_format(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::ServiceUnavailable(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;

        extract_content(chat)
    }

    fn backend_name(&self) -> &'static str {
        "openai"
    }
}

fn extract_content(chat: ChatResponse) -> ScoringResult<String> {
    chat.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ScoringError::InvalidResponse("completion has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"score\": 70, \"summary\": \"ok\"}"}}]
        }))
        .unwrap();
        assert_eq!(extract_content(chat).unwrap(), "{\"score\": 70, \"summary\": \"ok\"}");

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(extract_content(empty), Err(ScoringError::InvalidResponse(_))));

        let refusal: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert!(extract_content(refusal).is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: DEFAULT_MODEL,
            messages: vec![ChatMessage { role: "user", content: "{}" }],
            response_format: response_format(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["json_schema"]["schema"]["required"], json!(["score", "summary"]));
        assert_eq!(value["messages"][0]["role"], json!("user"));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let scorer = OpenAiScorer::new(
            String::new(),
            DEFAULT_BASE_URL.to_string(),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = scorer.score_payload("{}").await;
        assert!(matches!(result, Err(ScoringError::ServiceUnavailable(_))));
    }
}
