// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vision model adapters
//!
//! Anti-corruption layer between `ReadingExtractor` and the hosted
//! multimodal APIs. Every adapter sends the same instruction and funnels the
//! free-text reply through [`parse_reading_reply`].

pub mod gemini;
pub mod openai;
pub mod registry;

pub use gemini::GeminiAdapter;
pub use openai::OpenAIVisionAdapter;
pub use registry::from_config;

use reqwest::StatusCode;
use serde_json::Value;

use crate::domain::vision::{Reading, VisionError};

/// Instruction sent alongside every meter photograph.
pub const READING_PROMPT: &str = "Return the value and the measure unit like { \"value\": measured value as a integer, \"measure_unit\": measure unit }.";

const UNIT_KEYS: [&str; 3] = ["measure_unit", "measureUnit", "unit"];

/// Extract a JSON object from model output, tolerating markdown fences and
/// surrounding prose.
pub fn extract_json_from_response(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    let unfenced = match trimmed.find("```") {
        Some(open) => {
            let after = &trimmed[open + 3..];
            // Skip an optional language tag on the fence line.
            let body = after.find('\n').map(|nl| &after[nl + 1..]).unwrap_or(after);
            match body.find("```") {
                Some(close) => &body[..close],
                None => body,
            }
        }
        None => trimmed,
    };

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

/// Turn a model reply into a validated [`Reading`].
pub fn parse_reading_reply(text: &str) -> Result<Reading, VisionError> {
    let json = extract_json_from_response(text).ok_or_else(|| {
        VisionError::InvalidResponse(format!("no JSON object in model reply: {}", text.trim()))
    })?;

    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| VisionError::InvalidResponse(format!("malformed JSON in model reply: {}", e)))?;

    let value = match parsed.get("value") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(VisionError::InvalidResponse(
                "model reply has no usable 'value'".to_string(),
            ))
        }
    };

    let unit = UNIT_KEYS
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            VisionError::InvalidResponse("model reply has no measure unit".to_string())
        })?;

    let reading = Reading {
        value,
        unit: unit.to_string(),
    };
    reading.integer_value()?;
    Ok(reading)
}

/// Map a non-success HTTP status to the matching `VisionError`.
pub(crate) fn status_error(status: StatusCode, body: String, model: &str) -> VisionError {
    match status.as_u16() {
        401 | 403 => VisionError::Authentication(body),
        429 => VisionError::RateLimit,
        404 => VisionError::ModelNotFound(model.to_string()),
        _ => VisionError::Provider(format!("HTTP {}: {}", status, body)),
    }
}
