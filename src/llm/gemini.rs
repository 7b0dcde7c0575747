use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{TapCrewError, TapCrewResult};
use crate::llm::provider::ReasoningService;

/// generateContent-style HTTP provider (Gemini API shape).
pub struct GeminiProvider {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(id: String, api_base: String, api_key: String, model: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn build_parts(&self, prompt: &str, image: Option<&Path>) -> TapCrewResult<serde_json::Value> {
        let mut parts = vec![serde_json::json!({ "text": prompt })];
        if let Some(path) = image {
            let bytes = std::fs::read(path)?;
            let data = base64::engine::general_purpose::STANDARD.encode(bytes);
            parts.push(serde_json::json!({
                "inline_data": { "mime_type": "image/png", "data": data }
            }));
        }
        Ok(serde_json::Value::Array(parts))
    }
}

#[async_trait]
impl ReasoningService for GeminiProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str, image: Option<&Path>) -> TapCrewResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": self.build_parts(prompt, image)? }]
        });

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            prompt_len = prompt.len(),
            with_image = image.is_some(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(TapCrewError::Reasoning(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let text = extract_candidate_text(&json);
        if text.is_empty() {
            return Err(TapCrewError::Reasoning(
                "completion response carried no candidate text".into(),
            ));
        }

        tracing::debug!(provider = %self.id, reply_len = text.len(), "completion received");
        Ok(text)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_candidate_text(json: &serde_json::Value) -> String {
    json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_text_concatenates_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] }
            }]
        });
        assert_eq!(extract_candidate_text(&json), "hello world");
    }

    #[test]
    fn candidate_text_empty_on_malformed_response() {
        assert_eq!(extract_candidate_text(&serde_json::json!({})), "");
        assert_eq!(
            extract_candidate_text(&serde_json::json!({ "candidates": [] })),
            ""
        );
    }
}
