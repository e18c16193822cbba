// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Measure
//!
//! PostgreSQL implementation of `MeasureRepository` over the `measures`
//! table (see `cli/migrations`).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements postgres measure persistence
//!
//! `measure_datetime` is stored as an instant next to `measure_utc_offset`, so
//! the reported offset survives a round trip.
//!
//! `measure_month` holds the first day of the reading's local month and carries a
//! unique index together with `customer_code` and `measure_type`, so a second
//! insert for an occupied month fails atomically with a unique violation.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::domain::measure::{Measure, MeasureId, MeasureType};
use crate::domain::repository::{
    MeasureFilter, MeasurePatch, MeasureRepository, RepositoryError, UpdateOutcome,
};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, customer_code, measure_datetime, measure_utc_offset, measure_type, image_base64,
        measure_value, measure_unit, has_confirmed, created_at
    FROM measures
"#;

pub struct PostgresMeasureRepository {
    pool: PgPool,
}

impl PostgresMeasureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append ` WHERE ...` for every set field of `filter`.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &MeasureFilter) {
    let mut first = true;

    if let Some(id) = filter.id {
        push_clause(builder, &mut first);
        builder.push("id = ").push_bind(id.0);
    }
    if let Some(code) = &filter.customer_code {
        push_clause(builder, &mut first);
        builder.push("customer_code = ").push_bind(code.clone());
    }
    if let Some(measure_type) = filter.measure_type {
        push_clause(builder, &mut first);
        builder.push("measure_type = ").push_bind(measure_type.as_str());
    }
    if let Some(flag) = filter.has_confirmed {
        push_clause(builder, &mut first);
        builder.push("has_confirmed = ").push_bind(flag);
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, first: &mut bool) {
    builder.push(if *first { " WHERE " } else { " AND " });
    *first = false;
}

#[async_trait]
impl MeasureRepository for PostgresMeasureRepository {
    async fn insert(&self, measure: &Measure) -> Result<MeasureId, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO measures (
                id, customer_code, measure_datetime, measure_utc_offset, measure_month,
                measure_type, image_base64, measure_value, measure_unit, has_confirmed,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(measure.id.0)
        .bind(&measure.customer_code)
        .bind(measure.measure_datetime.with_timezone(&Utc))
        .bind(measure.measure_datetime.offset().local_minus_utc())
        .bind(measure.month().month_key())
        .bind(measure.measure_type.as_str())
        .bind(measure.image_base64())
        .bind(measure.measure_value())
        .bind(measure.measure_unit())
        .bind(measure.has_confirmed())
        .bind(measure.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let id: uuid::Uuid = row.get("id");
        Ok(MeasureId(id))
    }

    async fn find_one(&self, filter: &MeasureFilter) -> Result<Option<Measure>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_filter(&mut builder, filter);
        builder.push(" LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_measure_row).transpose()
    }

    async fn find(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_measure_row).collect()
    }

    async fn find_image(&self, id: MeasureId) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT image_base64 FROM measures WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get::<String, _>("image_base64")))
    }

    async fn update(
        &self,
        filter: &MeasureFilter,
        patch: &MeasurePatch,
    ) -> Result<UpdateOutcome, RepositoryError> {
        if patch.measure_value.is_none() && patch.has_confirmed.is_none() {
            return Ok(UpdateOutcome { affected: 0 });
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE measures SET ");
        {
            let mut assignments = builder.separated(", ");
            if let Some(value) = patch.measure_value {
                assignments.push("measure_value = ").push_bind_unseparated(value);
            }
            if let Some(flag) = patch.has_confirmed {
                assignments.push("has_confirmed = ").push_bind_unseparated(flag);
            }
        }
        push_filter(&mut builder, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(UpdateOutcome {
            affected: result.rows_affected(),
        })
    }

    async fn find_in_month(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        measure_type: MeasureType,
        customer_code: &str,
    ) -> Result<Option<Measure>, RepositoryError> {
        let query = format!(
            "{} WHERE measure_datetime BETWEEN $1 AND $2 AND measure_type = $3 AND customer_code = $4 LIMIT 1",
            SELECT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(start.with_timezone(&Utc))
            .bind(end.with_timezone(&Utc))
            .bind(measure_type.as_str())
            .bind(customer_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_measure_row).transpose()
    }
}

/// Parse a measure from a database row
fn parse_measure_row(row: PgRow) -> Result<Measure, RepositoryError> {
    let id: uuid::Uuid = row.get("id");
    let customer_code: String = row.get("customer_code");
    let measure_datetime: DateTime<Utc> = row.get("measure_datetime");
    let utc_offset: i32 = row.get("measure_utc_offset");
    let measure_type: String = row.get("measure_type");
    let image_base64: String = row.get("image_base64");
    let measure_value: i32 = row.get("measure_value");
    let measure_unit: String = row.get("measure_unit");
    let has_confirmed: bool = row.get("has_confirmed");
    let created_at: DateTime<Utc> = row.get("created_at");

    let measure_type: MeasureType = measure_type
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("Failed to parse measure_type: {}", e)))?;
    let offset = FixedOffset::east_opt(utc_offset).unwrap_or_else(|| Utc.fix());

    Ok(Measure::restore(
        MeasureId(id),
        customer_code,
        measure_datetime.with_timezone(&offset),
        measure_type,
        image_base64,
        measure_value,
        measure_unit,
        has_confirmed,
        created_at,
    ))
}
