// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gemini Vision Adapter
//
// Anti-Corruption Layer for the Google Generative Language API
// (`models/{model}:generateContent` with inline image data).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_reading_reply, status_error, READING_PROMPT};
use crate::domain::vision::{Reading, ReadingExtractor, VisionError};

pub struct GeminiAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ReadingExtractor for GeminiAdapter {
    async fn extract_reading(&self, image: &[u8], mime_type: &str) -> Result<Reading, VisionError> {
        if mime_type.is_empty() {
            return Err(VisionError::InvalidInput("unrecognized image format".to_string()));
        }

        let request = GenerateContentRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    RequestPart::Text {
                        text: READING_PROMPT.to_string(),
                    },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(image),
                        },
                    },
                ],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text, &self.model));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Provider(format!("Failed to parse response: {}", e)))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(VisionError::InvalidResponse("No response from model".into()));
        }

        debug!(model = %self.model, reply = %text, "Gemini reply received");
        parse_reading_reply(&text)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    fn adapter(endpoint: String) -> GeminiAdapter {
        GeminiAdapter::new(
            reqwest::Client::new(),
            endpoint,
            "test-key".to_string(),
            "gemini-1.5-flash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_extract_reading_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJsonString(
                r#"{"contents":[{"parts":[{"text":"Return the value and the measure unit like { \"value\": measured value as a integer, \"measure_unit\": measure unit }."},{"inline_data":{"mime_type":"image/jpeg","data":"/9j/4A=="}}]}]}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{\"value\": \"123\", \"measure_unit\": \"m3\"}\n```"}]}}]}"#,
            )
            .create_async()
            .await;

        let reading = adapter(server.url())
            .extract_reading(&JPEG, "image/jpeg")
            .await
            .unwrap();

        assert_eq!(reading.value, "123");
        assert_eq!(reading.unit, "m3");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_extract_reading_maps_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let err = adapter(server.url())
            .extract_reading(&JPEG, "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_extract_reading_without_candidates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = adapter(server.url())
            .extract_reading(&JPEG, "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unknown_mime_type_is_rejected_locally() {
        let err = adapter("http://127.0.0.1:9".to_string())
            .extract_reading(b"plain text", "")
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::InvalidInput(_)));
    }
}
