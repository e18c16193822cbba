// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vision
//!
//! Domain interfaces for the two image collaborators of the measure workflow.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption boundary in front of external vision models
//!   and content sniffing
//!
//! Implementations live in `crate::infrastructure::vision` and
//! `crate::infrastructure::image`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Numeric reading and unit as returned by a vision model.
///
/// `value` is kept textual; the workflow decides how it becomes an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub value: String,
    pub unit: String,
}

impl Reading {
    /// Integer meter value, truncated toward zero.
    pub fn integer_value(&self) -> Result<i32, VisionError> {
        let parsed: f64 = self.value.trim().parse().map_err(|_| {
            VisionError::InvalidResponse(format!("value '{}' is not numeric", self.value))
        })?;

        if !parsed.is_finite() {
            return Err(VisionError::InvalidResponse(format!(
                "value '{}' is not a finite number",
                self.value
            )));
        }

        let truncated = parsed.trunc();
        if truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
            return Err(VisionError::InvalidResponse(format!(
                "value '{}' is out of range",
                self.value
            )));
        }

        Ok(truncated as i32)
    }
}

/// Extracts a meter reading from a photograph through an external AI model.
#[async_trait]
pub trait ReadingExtractor: Send + Sync {
    /// Read the meter shown in `image`. `mime_type` may be empty when the
    /// format could not be sniffed.
    ///
    /// On success the value parses as a number and the unit is non-empty;
    /// malformed model replies are errors, never partial readings.
    async fn extract_reading(&self, image: &[u8], mime_type: &str) -> Result<Reading, VisionError>;

    /// Provider identifier for logs (e.g. "gemini").
    fn provider_name(&self) -> &str;
}

/// Best-effort content-type detection from raw bytes.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// MIME type such as `image/jpeg`, or an empty string when undetectable.
    async fn classify_image_type(&self, image: &[u8]) -> String;
}

/// Errors that can occur while talking to a vision provider
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: &str) -> Reading {
        Reading {
            value: value.to_string(),
            unit: "m3".to_string(),
        }
    }

    #[test]
    fn test_integer_value_plain() {
        assert_eq!(reading("123").integer_value().unwrap(), 123);
        assert_eq!(reading(" 0042 ").integer_value().unwrap(), 42);
    }

    #[test]
    fn test_integer_value_truncates_fraction() {
        assert_eq!(reading("123.9").integer_value().unwrap(), 123);
        assert_eq!(reading("-7.8").integer_value().unwrap(), -7);
    }

    #[test]
    fn test_integer_value_rejects_garbage() {
        assert!(matches!(
            reading("abc").integer_value(),
            Err(VisionError::InvalidResponse(_))
        ));
        assert!(reading("NaN").integer_value().is_err());
        assert!(reading("inf").integer_value().is_err());
        assert!(reading("1e12").integer_value().is_err());
    }
}
