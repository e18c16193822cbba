// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `measure serve`: load, override and validate configuration, then run the
//! HTTP API.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use measure_core::domain::config::ServiceConfig;

use crate::server;

pub async fn execute(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = load(config_path, host, port)?;

    info!(
        name = %config.metadata.name,
        storage = ?config.spec.storage.backend,
        vision = ?config.spec.vision.provider,
        "Configuration loaded"
    );

    server::run(config).await
}

/// Load configuration and apply `--host` / `--port` on top of it.
fn load(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    if let Some(host) = host {
        config.spec.server.bind_address = host;
    }
    if let Some(port) = port {
        config.spec.server.port = port;
    }

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("measure-config.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "apiVersion: measure.io/v1\nkind: ServiceConfig\nmetadata:\n  name: test\nspec:\n  server:\n    port: 4000\n    public_port: 443\n",
        );

        let config = load(Some(path), Some("127.0.0.1".to_string()), Some(5000)).unwrap();
        assert_eq!(config.spec.server.bind_address, "127.0.0.1");
        assert_eq!(config.spec.server.port, 5000);
        assert_eq!(config.spec.server.effective_public_port(), 443);
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "apiVersion: other/v1\nkind: ServiceConfig\nmetadata:\n  name: test\nspec: {}\n",
        );
        assert!(load(Some(path), None, None).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(load(Some(missing), None, None).is_err());
    }
}
