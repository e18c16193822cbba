// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP server host
//!
//! Builds the measure workflow from a `ServiceConfig` and serves the router
//! until a shutdown signal arrives.

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use measure_core::{
    application::{MeasureService, StandardMeasureService},
    domain::{
        config::ServiceConfig,
        repository::{MeasureRepository, StorageBackend},
    },
    infrastructure::{
        db::Database,
        image::{ImageUrlBuilder, InferImageClassifier},
        repositories::{InMemoryMeasureRepository, PostgresMeasureRepository},
        vision,
    },
    presentation::api,
};

/// Repository selected by `spec.storage`.
pub async fn build_repository(config: &ServiceConfig) -> Result<Arc<dyn MeasureRepository>> {
    match config.storage_backend()? {
        StorageBackend::InMemory => {
            info!("Using in-memory measure storage");
            Ok(Arc::new(InMemoryMeasureRepository::new()))
        }
        StorageBackend::PostgreSQL(pg) => {
            let db = Database::new(&pg)
                .await
                .context("Failed to connect to PostgreSQL")?;
            Ok(Arc::new(PostgresMeasureRepository::new(db.get_pool().clone())))
        }
    }
}

/// Assemble the router for `config`.
pub async fn build_app(config: &ServiceConfig) -> Result<Router> {
    let repository = build_repository(config).await?;
    let extractor = vision::from_config(&config.spec.vision)
        .context("Failed to initialize vision provider")?;

    let classifier = Arc::new(InferImageClassifier::new());
    let server = &config.spec.server;
    let url_builder = ImageUrlBuilder::new(
        server.public_host.clone(),
        server.effective_public_port(),
        classifier.clone(),
    );

    let service: Arc<dyn MeasureService> = Arc::new(StandardMeasureService::new(
        repository,
        extractor,
        classifier,
        url_builder,
    ));

    let body_limit_bytes = server.body_limit_mb.saturating_mul(1024 * 1024);
    Ok(api::app(service, body_limit_bytes))
}

/// Install the Prometheus exporter when `spec.observability.metrics` is enabled.
pub fn init_metrics(config: &ServiceConfig) -> Result<()> {
    let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    else {
        return Ok(());
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], metrics.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!("measure_created_total", "Readings accepted and stored");
    metrics::describe_counter!(
        "measure_rejected_total",
        "Readings rejected by a business rule, labelled by reason"
    );
    metrics::describe_counter!("measure_confirmed_total", "Readings confirmed by a human");
    metrics::describe_counter!(
        "measure_extraction_failures_total",
        "Vision provider calls that failed to produce a reading"
    );

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

pub async fn run(config: ServiceConfig) -> Result<()> {
    init_metrics(&config)?;
    let app = build_app(&config).await?;

    let addr = format!("{}:{}", config.spec.server.bind_address, config.spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Measure API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Measure API shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use measure_core::domain::config::StorageKind;

    #[tokio::test]
    async fn test_build_app_with_defaults_and_literal_key() {
        let mut config = ServiceConfig::default();
        config.spec.vision.api_key = Some("literal-test-key".to_string());
        assert!(build_app(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_app_with_oversized_body_limit() {
        let mut config = ServiceConfig::default();
        config.spec.vision.api_key = Some("literal-test-key".to_string());
        config.spec.server.body_limit_mb = usize::MAX;
        assert!(build_app(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_postgres_without_url_is_rejected() {
        let mut config = ServiceConfig::default();
        config.spec.storage.backend = StorageKind::Postgres;
        config.spec.storage.database_url = None;
        assert!(build_repository(&config).await.is_err());
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        assert!(init_metrics(&ServiceConfig::default()).is_ok());
    }
}
