// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Vision Provider Factory
//
// Builds the configured `ReadingExtractor` from `spec.vision`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::gemini::GeminiAdapter;
use super::openai::OpenAIVisionAdapter;
use crate::domain::config::{resolve_secret, VisionConfig, VisionProviderKind};
use crate::domain::vision::ReadingExtractor;

/// Create the reading extractor described by `config`.
pub fn from_config(config: &VisionConfig) -> anyhow::Result<Arc<dyn ReadingExtractor>> {
    let api_key = resolve_api_key(config.api_key.as_deref())?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    info!(
        provider = ?config.provider,
        model = %config.model,
        endpoint = %config.endpoint,
        "Initializing vision provider"
    );

    let extractor: Arc<dyn ReadingExtractor> = match config.provider {
        VisionProviderKind::Gemini => Arc::new(GeminiAdapter::new(
            client,
            config.endpoint.clone(),
            api_key,
            config.model.clone(),
        )),
        VisionProviderKind::Openai => Arc::new(OpenAIVisionAdapter::new(
            client,
            config.endpoint.clone(),
            api_key,
            config.model.clone(),
        )),
    };

    Ok(extractor)
}

fn resolve_api_key(value: Option<&str>) -> anyhow::Result<String> {
    let value = value.ok_or_else(|| anyhow::anyhow!("spec.vision.api_key is not set"))?;
    resolve_secret(value).ok_or_else(|| match value.strip_prefix("env:") {
        Some(var) => anyhow::anyhow!("Environment variable {} not set", var),
        None => anyhow::anyhow!("spec.vision.api_key is empty"),
    })
}
