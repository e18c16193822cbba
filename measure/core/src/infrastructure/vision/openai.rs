// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI Vision Adapter
//
// Anti-Corruption Layer for OpenAI-compatible chat completions with image
// input (OpenAI, LM Studio, vLLM, etc.). The photograph travels as a
// `data:` URL.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_reading_reply, status_error, READING_PROMPT};
use crate::domain::vision::{Reading, ReadingExtractor, VisionError};

pub struct OpenAIVisionAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAIVisionAdapter {
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
impl ReadingExtractor for OpenAIVisionAdapter {
    async fn extract_reading(&self, image: &[u8], mime_type: &str) -> Result<Reading, VisionError> {
        if mime_type.is_empty() {
            return Err(VisionError::InvalidInput("unrecognized image format".to_string()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: READING_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", mime_type, STANDARD.encode(image)),
                        },
                    },
                ],
            }],
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text, &self.model));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Provider(format!("Failed to parse response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VisionError::InvalidResponse("No response from model".into()))?;

        debug!(model = %self.model, reply = %text, "OpenAI reply received");
        parse_reading_reply(&text)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
