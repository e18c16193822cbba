// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Image
//!
//! Content sniffing for stored meter photographs and the public URL under
//! which each photograph is served.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `ImageClassifier` with magic-byte detection
//!   (`infer`) and derives `<host>:<port>/public/<id>.<extension>` URLs

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use std::sync::Arc;

use crate::domain::measure::MeasureId;
use crate::domain::vision::ImageClassifier;

/// Magic-byte classifier backed by the `infer` crate.
#[derive(Debug, Clone, Default)]
pub struct InferImageClassifier;

impl InferImageClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageClassifier for InferImageClassifier {
    async fn classify_image_type(&self, image: &[u8]) -> String {
        infer::get(image)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_default()
    }
}

/// Builds the publicly addressable URL of a stored photograph.
///
/// Host and port are concatenated verbatim; the extension is the subtype of
/// the sniffed MIME type and is left empty when sniffing fails.
#[derive(Clone)]
pub struct ImageUrlBuilder {
    host: String,
    port: u16,
    classifier: Arc<dyn ImageClassifier>,
}

impl ImageUrlBuilder {
    pub fn new(host: impl Into<String>, port: u16, classifier: Arc<dyn ImageClassifier>) -> Self {
        Self {
            host: host.into(),
            port,
            classifier,
        }
    }

    pub async fn build_image_url(&self, image: &[u8], id: MeasureId) -> String {
        let mime_type = self.classifier.classify_image_type(image).await;
        let extension = mime_type.split('/').nth(1).unwrap_or("");
        format!("{}:{}/public/{}.{}", self.host, self.port, id, extension)
    }
}

/// Decode a base64 image accepting the standard and URL-safe alphabets,
/// padded or not.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = encoded.trim();
    STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
}
