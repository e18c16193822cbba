// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the `Measure` aggregate. The interface lives in
//! the domain layer and is implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `MeasureRepository` | `Measure` | `InMemoryMeasureRepository`, `PostgresMeasureRepository` |
//!
//! ## Conditional writes
//!
//! `insert` refuses a second record in an occupied (customer, type, month)
//! bucket with [`RepositoryError::Conflict`], and `update` only touches rows
//! that match every field of its filter, reporting how many it changed. The
//! workflow builds its duplicate and confirmation guarantees on these two
//! properties instead of on separate read-then-write calls.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::domain::measure::{Measure, MeasureId, MeasureType};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Exact-match filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasureFilter {
    pub id: Option<MeasureId>,
    pub customer_code: Option<String>,
    pub measure_type: Option<MeasureType>,
    pub has_confirmed: Option<bool>,
}

impl MeasureFilter {
    pub fn by_id(id: MeasureId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_customer(customer_code: impl Into<String>, measure_type: Option<MeasureType>) -> Self {
        Self {
            customer_code: Some(customer_code.into()),
            measure_type,
            ..Self::default()
        }
    }

    pub fn unconfirmed(mut self) -> Self {
        self.has_confirmed = Some(false);
        self
    }

    pub fn matches(&self, measure: &Measure) -> bool {
        self.id.map_or(true, |id| measure.id == id)
            && self
                .customer_code
                .as_deref()
                .map_or(true, |code| measure.customer_code == code)
            && self.measure_type.map_or(true, |t| measure.measure_type == t)
            && self
                .has_confirmed
                .map_or(true, |flag| measure.has_confirmed() == flag)
    }
}

/// Partial update. Only the mutable fields of a measure can be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurePatch {
    pub measure_value: Option<i32>,
    pub has_confirmed: Option<bool>,
}

impl MeasurePatch {
    pub fn confirmation(confirmed_value: i32) -> Self {
        Self {
            measure_value: Some(confirmed_value),
            has_confirmed: Some(true),
        }
    }
}

/// Result of an `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub affected: u64,
}

/// Repository interface for Measure aggregates
#[async_trait]
pub trait MeasureRepository: Send + Sync {
    /// Persist a new measure and return its identifier.
    ///
    /// Fails with `RepositoryError::Conflict` when another measure already
    /// occupies the same customer / type / calendar month.
    async fn insert(&self, measure: &Measure) -> Result<MeasureId, RepositoryError>;

    /// Single-record lookup by exact-match filter.
    async fn find_one(&self, filter: &MeasureFilter) -> Result<Option<Measure>, RepositoryError>;

    /// Multi-record lookup, in storage order.
    async fn find(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, RepositoryError>;

    /// Stored image payload (base64) of a single measure. Projection limited
    /// to that one field.
    async fn find_image(&self, id: MeasureId) -> Result<Option<String>, RepositoryError>;

    /// Apply `patch` to every record matching `filter`.
    async fn update(
        &self,
        filter: &MeasureFilter,
        patch: &MeasurePatch,
    ) -> Result<UpdateOutcome, RepositoryError>;

    /// A measure for `customer_code` / `measure_type` whose `measure_datetime`
    /// falls within `[start, end]`, both bounds inclusive.
    async fn find_in_month(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        measure_type: MeasureType,
        customer_code: &str,
    ) -> Result<Option<Measure>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(db_err.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measure::NewMeasure;

    fn measure(customer: &str, measure_type: MeasureType) -> Measure {
        Measure::new(NewMeasure {
            customer_code: customer.to_string(),
            measure_datetime: chrono::Utc::now().fixed_offset(),
            measure_type,
            image_base64: String::new(),
            measure_value: 1,
            measure_unit: "m3".to_string(),
        })
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let m = measure("C1", MeasureType::Gas);
        assert!(MeasureFilter::default().matches(&m));
    }

    #[test]
    fn test_customer_filter_with_optional_type() {
        let water = measure("C1", MeasureType::Water);
        let gas = measure("C1", MeasureType::Gas);
        let other = measure("C2", MeasureType::Water);

        let any_type = MeasureFilter::by_customer("C1", None);
        assert!(any_type.matches(&water));
        assert!(any_type.matches(&gas));
        assert!(!any_type.matches(&other));

        let water_only = MeasureFilter::by_customer("C1", Some(MeasureType::Water));
        assert!(water_only.matches(&water));
        assert!(!water_only.matches(&gas));
    }

    #[test]
    fn test_unconfirmed_filter_excludes_confirmed() {
        let mut m = measure("C1", MeasureType::Water);
        let filter = MeasureFilter::by_id(m.id).unconfirmed();
        assert!(filter.matches(&m));
        m.confirm(5).unwrap();
        assert!(!filter.matches(&m));
    }
}
