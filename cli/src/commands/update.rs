// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Update Command
//!
//! Implements `measure update`, which applies the SQLx migrations that
//! create the `measures` table and its indexes.
//!
//! # Architecture
//!
//! - **Layer:** CLI/Presentation
//! - **Purpose:** Database schema migration management
//! - **Integration:** CLI → SQLx Migrator → PostgreSQL
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! measure update
//!
//! # Preview migrations without applying
//! measure update --dry-run
//! ```
//!
//! # Environment
//!
//! The database comes from `spec.storage.database_url` or `DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;

use measure_core::domain::config::ServiceConfig;
use measure_core::domain::repository::StorageBackend;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Args)]
pub struct UpdateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: UpdateCommand, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", "Measure Update".bold().green());

    let config = ServiceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    let database_url = match config.storage_backend()? {
        StorageBackend::PostgreSQL(pg) => pg.connection_string,
        StorageBackend::InMemory => anyhow::bail!(
            "No PostgreSQL database configured. Set DATABASE_URL or spec.storage.database_url."
        ),
    };

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let applied_count = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);

    let total_migrations = MIGRATOR.iter().count();

    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded() {
        let migrations: Vec<_> = MIGRATOR.iter().collect();
        assert_eq!(migrations.len(), 1);
        assert!(migrations[0].sql.contains("CREATE UNIQUE INDEX"));
        assert!(migrations[0].sql.contains("measure_month"));
        assert!(migrations[0].sql.contains("measure_utc_offset"));
    }
}
