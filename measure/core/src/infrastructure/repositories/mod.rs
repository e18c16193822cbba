// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the `MeasureRepository` abstraction
//! defined in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve `Measure` aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresMeasureRepository** - `measures` table, month uniqueness
//!   enforced by a unique index
//! - **InMemoryMeasureRepository** - insertion-ordered, lock-guarded storage
//!   for development and tests
//!
//! # Usage
//!
//! ```no_run
//! use measure_core::domain::measure::MeasureId;
//! use measure_core::domain::repository::{MeasureFilter, MeasureRepository};
//! use measure_core::infrastructure::repositories::PostgresMeasureRepository;
//! use sqlx::PgPool;
//!
//! # async fn example(database_url: &str, measure_id: MeasureId) -> anyhow::Result<()> {
//! let pool = PgPool::connect(database_url).await?;
//! let repo = PostgresMeasureRepository::new(pool);
//!
//! let measure = repo.find_one(&MeasureFilter::by_id(measure_id)).await?;
//! # let _ = measure;
//! # Ok(())
//! # }
//! ```

pub mod postgres_measure;

pub use postgres_measure::PostgresMeasureRepository;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::measure::{Measure, MeasureId, MeasureType};
use crate::domain::repository::{
    MeasureFilter, MeasurePatch, MeasureRepository, RepositoryError, UpdateOutcome,
};

#[derive(Clone, Default)]
pub struct InMemoryMeasureRepository {
    measures: Arc<RwLock<Vec<Measure>>>,
}

impl InMemoryMeasureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Measure>>, RepositoryError> {
        self.measures
            .read()
            .map_err(|_| RepositoryError::Unknown("measure store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Measure>>, RepositoryError> {
        self.measures
            .write()
            .map_err(|_| RepositoryError::Unknown("measure store lock poisoned".to_string()))
    }
}

#[async_trait]
impl MeasureRepository for InMemoryMeasureRepository {
    async fn insert(&self, measure: &Measure) -> Result<MeasureId, RepositoryError> {
        let mut measures = self.write()?;

        if measures.iter().any(|m| m.id == measure.id) {
            return Err(RepositoryError::Conflict(format!("measure {} already exists", measure.id)));
        }

        // Check and insert under the same lock. Buckets are compared by each
        // reading's own local month, like the unique index in Postgres.
        let month = measure.month();
        let occupied = measures.iter().any(|m| {
            m.customer_code == measure.customer_code
                && m.measure_type == measure.measure_type
                && m.month().month_key() == month.month_key()
        });
        if occupied {
            return Err(RepositoryError::Conflict(format!(
                "{} / {} already reported for {}",
                measure.customer_code,
                measure.measure_type,
                month.month_key()
            )));
        }

        measures.push(measure.clone());
        Ok(measure.id)
    }

    async fn find_one(&self, filter: &MeasureFilter) -> Result<Option<Measure>, RepositoryError> {
        let measures = self.read()?;
        Ok(measures.iter().find(|m| filter.matches(m)).cloned())
    }

    async fn find(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, RepositoryError> {
        let measures = self.read()?;
        Ok(measures.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn find_image(&self, id: MeasureId) -> Result<Option<String>, RepositoryError> {
        let measures = self.read()?;
        Ok(measures
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.image_base64().to_string()))
    }

    async fn update(
        &self,
        filter: &MeasureFilter,
        patch: &MeasurePatch,
    ) -> Result<UpdateOutcome, RepositoryError> {
        let mut measures = self.write()?;
        let mut affected = 0;

        for slot in measures.iter_mut().filter(|m| filter.matches(m)) {
            let patched = Measure::restore(
                slot.id,
                slot.customer_code.clone(),
                slot.measure_datetime,
                slot.measure_type,
                slot.image_base64().to_string(),
                patch.measure_value.unwrap_or(slot.measure_value()),
                slot.measure_unit().to_string(),
                patch.has_confirmed.unwrap_or(slot.has_confirmed()),
                slot.created_at,
            );
            *slot = patched;
            affected += 1;
        }

        Ok(UpdateOutcome { affected })
    }

    async fn find_in_month(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        measure_type: MeasureType,
        customer_code: &str,
    ) -> Result<Option<Measure>, RepositoryError> {
        let measures = self.read()?;
        Ok(measures
            .iter()
            .find(|m| {
                m.customer_code == customer_code
                    && m.measure_type == measure_type
                    && m.measure_datetime >= start
                    && m.measure_datetime <= end
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measure::{MonthBounds, NewMeasure};

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn measure(customer: &str, measure_type: MeasureType, at: &str) -> Measure {
        Measure::new(NewMeasure {
            customer_code: customer.to_string(),
            measure_datetime: ts(at),
            measure_type,
            image_base64: "aGVsbG8=".to_string(),
            measure_value: 100,
            measure_unit: "m3".to_string(),
        })
    }

    #[tokio::test]
    async fn test_insert_and_find_one() {
        let repo = InMemoryMeasureRepository::new();
        let m = measure("C1", MeasureType::Water, "2024-03-15T00:00:00Z");
        let id = repo.insert(&m).await.unwrap();
        assert_eq!(id, m.id);

        let found = repo.find_one(&MeasureFilter::by_id(id)).await.unwrap().unwrap();
        assert_eq!(found, m);
        assert!(repo
            .find_one(&MeasureFilter::by_id(MeasureId::new()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_same_month_bucket() {
        let repo = InMemoryMeasureRepository::new();
        repo.insert(&measure("C1", MeasureType::Water, "2024-03-01T00:00:00Z"))
            .await
            .unwrap();

        let err = repo
            .insert(&measure("C1", MeasureType::Water, "2024-03-31T23:59:59Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // Other type, other customer and next month are all free.
        repo.insert(&measure("C1", MeasureType::Gas, "2024-03-10T00:00:00Z"))
            .await
            .unwrap();
        repo.insert(&measure("C2", MeasureType::Water, "2024-03-10T00:00:00Z"))
            .await
            .unwrap();
        repo.insert(&measure("C1", MeasureType::Water, "2024-04-01T00:00:00Z"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_month_bucket_uses_local_calendar() {
        let repo = InMemoryMeasureRepository::new();
        // Same instant as 2024-04-01T01:00:00Z, but a March reading locally.
        repo.insert(&measure("C1", MeasureType::Water, "2024-03-31T22:00:00-03:00"))
            .await
            .unwrap();

        repo.insert(&measure("C1", MeasureType::Water, "2024-04-15T10:00:00-03:00"))
            .await
            .unwrap();

        let err = repo
            .insert(&measure("C1", MeasureType::Water, "2024-03-02T09:00:00-03:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_in_month_inclusive_bounds() {
        let repo = InMemoryMeasureRepository::new();
        repo.insert(&measure("C1", MeasureType::Gas, "2024-03-31T23:59:59.999Z"))
            .await
            .unwrap();

        let march = MonthBounds::containing(ts("2024-03-05T00:00:00Z"));
        let hit = repo
            .find_in_month(march.start, march.end, MeasureType::Gas, "C1")
            .await
            .unwrap();
        assert!(hit.is_some());

        let april = MonthBounds::containing(ts("2024-04-01T00:00:00Z"));
        let miss = repo
            .find_in_month(april.start, april.end, MeasureType::Gas, "C1")
            .await
            .unwrap();
        assert!(miss.is_none());

        let other_type = repo
            .find_in_month(march.start, march.end, MeasureType::Water, "C1")
            .await
            .unwrap();
        assert!(other_type.is_none());
    }

    #[tokio::test]
    async fn test_find_preserves_insertion_order() {
        let repo = InMemoryMeasureRepository::new();
        let first = measure("C1", MeasureType::Water, "2024-05-01T00:00:00Z");
        let second = measure("C1", MeasureType::Water, "2024-01-01T00:00:00Z");
        let third = measure("C1", MeasureType::Gas, "2024-03-01T00:00:00Z");
        for m in [&first, &second, &third] {
            repo.insert(m).await.unwrap();
        }

        let all = repo.find(&MeasureFilter::by_customer("C1", None)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);

        let water = repo
            .find(&MeasureFilter::by_customer("C1", Some(MeasureType::Water)))
            .await
            .unwrap();
        assert_eq!(water.len(), 2);
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        let repo = InMemoryMeasureRepository::new();
        let m = measure("C1", MeasureType::Water, "2024-03-15T00:00:00Z");
        repo.insert(&m).await.unwrap();

        let filter = MeasureFilter::by_id(m.id).unconfirmed();
        let first = repo.update(&filter, &MeasurePatch::confirmation(130)).await.unwrap();
        assert_eq!(first.affected, 1);

        let second = repo.update(&filter, &MeasurePatch::confirmation(999)).await.unwrap();
        assert_eq!(second.affected, 0);

        let stored = repo.find_one(&MeasureFilter::by_id(m.id)).await.unwrap().unwrap();
        assert!(stored.has_confirmed());
        assert_eq!(stored.measure_value(), 130);
        assert_eq!(stored.image_base64(), m.image_base64());
        assert_eq!(stored.measure_unit(), "m3");
    }

    #[tokio::test]
    async fn test_find_image_projection() {
        let repo = InMemoryMeasureRepository::new();
        let m = measure("C1", MeasureType::Water, "2024-03-15T00:00:00Z");
        repo.insert(&m).await.unwrap();

        assert_eq!(repo.find_image(m.id).await.unwrap().as_deref(), Some("aGVsbG8="));
        assert!(repo.find_image(MeasureId::new()).await.unwrap().is_none());
    }
}
