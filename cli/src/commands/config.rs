// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use measure_core::domain::config::{ServiceConfig, StorageKind};

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./measure-config.yaml)
        #[arg(short, long, default_value = "./measure-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = ServiceConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. MEASURE_CONFIG_PATH: {}",
            std::env::var("MEASURE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./measure-config.yaml");
        println!("  4. ~/.measure/config.yaml");
        println!("  5. /etc/measure/config.yaml");
        println!();
    }

    if as_yaml {
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        println!("{}", yaml);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let server = &config.spec.server;
    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", server.bind_address, server.port);
    println!(
        "  Image URLs: {}:{}/public/<measure_uuid>.<ext>",
        server.public_host,
        server.effective_public_port()
    );
    println!("  Body limit: {} MB", server.body_limit_mb);
    println!();

    let storage = &config.spec.storage;
    println!("{}", "Storage:".bold());
    match storage.backend {
        StorageKind::InMemory => println!("  Backend: in-memory"),
        StorageKind::Postgres => {
            println!("  Backend: postgres");
            println!("  Max connections: {}", storage.max_connections);
            // Credentials are never echoed.
            let url = if storage.database_url.is_some() {
                "(set)".green()
            } else {
                "(missing)".red()
            };
            println!("  Database URL: {}", url);
        }
    }
    println!();

    let vision = &config.spec.vision;
    println!("{}", "Vision:".bold());
    println!("  Provider: {:?}", vision.provider);
    println!("  Endpoint: {}", vision.endpoint);
    println!("  Model: {}", vision.model);
    println!("  Timeout: {}s", vision.timeout_secs);
    println!();

    if let Some(observability) = &config.spec.observability {
        println!("{}", "Observability:".bold());
        println!("  Log level: {}", observability.log_level);
        if let Some(metrics) = observability.metrics.as_ref().filter(|m| m.enabled) {
            println!("  Prometheus: 0.0.0.0:{}", metrics.port);
        }
        println!();
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ServiceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    write_template(output, with_examples)?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn write_template(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))
}
