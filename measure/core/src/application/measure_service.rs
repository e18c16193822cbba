// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Measure Workflow Service
//!
//! Application service that sequences duplicate detection, reading
//! extraction, persistence, image URL derivation and confirmation.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Enforce the measure lifecycle rules and answer every
//!   call with a typed outcome
//! - **Collaborators:**
//!   - Domain: `Measure` aggregate, `MonthBounds`
//!   - Infrastructure: `MeasureRepository`, `ReadingExtractor`,
//!     `ImageClassifier`, `ImageUrlBuilder`
//!
//! # Error Handling
//!
//! Business-rule violations come back as dedicated [`MeasureFailure`]
//! variants. Any collaborator fault, and any panic raised while serving a
//! call, is logged and reported as [`MeasureFailure::Internal`]; nothing
//! escapes the service boundary.
//!
//! If the insert succeeds but URL derivation fails afterwards, the stored
//! measure is kept.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures::FutureExt;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::measure::{Measure, MeasureError, MeasureId, MeasureType, MonthBounds, NewMeasure};
use crate::domain::repository::{MeasureFilter, MeasurePatch, MeasureRepository, RepositoryError};
use crate::domain::vision::{ImageClassifier, ReadingExtractor};
use crate::infrastructure::image::{decode_image, ImageUrlBuilder};

/// Outcome category of a workflow call, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Ok,
    BadRequest,
    NotFound,
    Conflict,
    InternalError,
}

impl ResultStatus {
    pub fn http_code(&self) -> u16 {
        match self {
            ResultStatus::Ok => 200,
            ResultStatus::BadRequest => 400,
            ResultStatus::NotFound => 404,
            ResultStatus::Conflict => 409,
            ResultStatus::InternalError => 500,
        }
    }
}

/// Error payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error_code: String,
    pub error_description: String,
}

/// Every way a workflow call can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeasureFailure {
    #[error("Reading for this month has already been recorded")]
    DoubleReport,

    #[error("Measure not found")]
    MeasureNotFound,

    #[error("Reading has already been confirmed")]
    ConfirmationDuplicate,

    #[error("No readings found")]
    MeasuresNotFound,

    #[error("Unable to complete the operation. ERROR: {0}")]
    Internal(String),
}

impl MeasureFailure {
    pub fn status(&self) -> ResultStatus {
        match self {
            MeasureFailure::DoubleReport | MeasureFailure::ConfirmationDuplicate => ResultStatus::Conflict,
            MeasureFailure::MeasureNotFound | MeasureFailure::MeasuresNotFound => ResultStatus::NotFound,
            MeasureFailure::Internal(_) => ResultStatus::InternalError,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MeasureFailure::DoubleReport => "DOUBLE_REPORT",
            MeasureFailure::MeasureNotFound => "MEASURE_NOT_FOUND",
            MeasureFailure::ConfirmationDuplicate => "CONFIRMATION_DUPLICATE",
            MeasureFailure::MeasuresNotFound => "MEASURES_NOT_FOUND",
            MeasureFailure::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code().to_string(),
            error_description: self.to_string(),
        }
    }
}

pub type MeasureResult<T> = Result<T, MeasureFailure>;

#[derive(Debug, Clone)]
pub struct CreateMeasureCommand {
    pub image_base64: String,
    pub customer_code: String,
    pub measure_datetime: DateTime<FixedOffset>,
    pub measure_type: MeasureType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedMeasure {
    pub image_url: String,
    pub measure_value: i32,
    #[serde(rename = "measure_uuid")]
    pub measure_id: MeasureId,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmMeasureCommand {
    pub measure_id: MeasureId,
    pub confirmed_value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedMeasure {
    pub success: bool,
}

/// Listing projection of a measure. Never carries the image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasureSummary {
    #[serde(rename = "measure_uuid")]
    pub id: MeasureId,
    pub measure_datetime: DateTime<FixedOffset>,
    pub measure_type: MeasureType,
    pub has_confirmed: bool,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerMeasures {
    pub customer_code: String,
    pub measures: Vec<MeasureSummary>,
}

/// Raw photograph bytes. Empty when the measure does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasureImage {
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait MeasureService: Send + Sync {
    /// Record a new reading from a base64 photograph.
    async fn create_measure(&self, command: CreateMeasureCommand) -> MeasureResult<CreatedMeasure>;

    /// One-time confirmation / correction of an extracted value.
    async fn update_measure(&self, command: ConfirmMeasureCommand) -> MeasureResult<ConfirmedMeasure>;

    /// All readings of a customer, optionally restricted to one meter type.
    async fn get_measures(
        &self,
        customer_code: &str,
        measure_type: Option<MeasureType>,
    ) -> MeasureResult<CustomerMeasures>;

    /// Stored photograph of a reading.
    async fn get_image(&self, measure_id: MeasureId) -> MeasureResult<MeasureImage>;
}

/// Standard implementation of MeasureService
pub struct StandardMeasureService {
    repository: Arc<dyn MeasureRepository>,
    extractor: Arc<dyn ReadingExtractor>,
    classifier: Arc<dyn ImageClassifier>,
    url_builder: ImageUrlBuilder,
}

impl StandardMeasureService {
    pub fn new(
        repository: Arc<dyn MeasureRepository>,
        extractor: Arc<dyn ReadingExtractor>,
        classifier: Arc<dyn ImageClassifier>,
        url_builder: ImageUrlBuilder,
    ) -> Self {
        Self {
            repository,
            extractor,
            classifier,
            url_builder,
        }
    }

    async fn create(&self, command: CreateMeasureCommand) -> MeasureResult<CreatedMeasure> {
        // Step 1: Duplicate-month check
        let month = MonthBounds::containing(command.measure_datetime);
        let existing = self
            .repository
            .find_in_month(month.start, month.end, command.measure_type, &command.customer_code)
            .await
            .map_err(|e| storage_fault("duplicate check", e))?;

        if existing.is_some() {
            info!(
                customer_code = %command.customer_code,
                measure_type = %command.measure_type,
                month = %month.month_key(),
                "Rejecting reading: month already reported"
            );
            metrics::counter!("measure_rejected_total", "reason" => "double_report").increment(1);
            return Err(MeasureFailure::DoubleReport);
        }

        // Step 2: Extract the reading
        let image = decode_image(&command.image_base64).map_err(|e| internal("image decoding", e))?;
        let mime_type = self.classifier.classify_image_type(&image).await;

        let reading = self
            .extractor
            .extract_reading(&image, &mime_type)
            .await
            .map_err(|e| {
                metrics::counter!("measure_extraction_failures_total").increment(1);
                internal(&format!("reading extraction ({})", self.extractor.provider_name()), e)
            })?;
        let measure_value = reading
            .integer_value()
            .map_err(|e| internal("reading extraction", e))?;

        // Step 3: Persist
        let measure = Measure::new(NewMeasure {
            customer_code: command.customer_code,
            measure_datetime: command.measure_datetime,
            measure_type: command.measure_type,
            image_base64: command.image_base64,
            measure_value,
            measure_unit: reading.unit,
        });

        let measure_id = match self.repository.insert(&measure).await {
            Ok(id) => id,
            Err(RepositoryError::Conflict(reason)) => {
                // Lost a race against a concurrent submission for the same month.
                warn!("Insert rejected by storage month constraint: {}", reason);
                metrics::counter!("measure_rejected_total", "reason" => "double_report").increment(1);
                return Err(MeasureFailure::DoubleReport);
            }
            Err(e) => return Err(storage_fault("measure insert", e)),
        };

        // Step 4: Derive the public URL (not persisted)
        let image_url = self.url_builder.build_image_url(&image, measure_id).await;

        metrics::counter!("measure_created_total").increment(1);
        info!(
            measure_id = %measure_id,
            customer_code = %measure.customer_code,
            measure_type = %measure.measure_type,
            "Measure recorded"
        );

        Ok(CreatedMeasure {
            image_url,
            measure_value,
            measure_id,
        })
    }

    async fn confirm(&self, command: ConfirmMeasureCommand) -> MeasureResult<ConfirmedMeasure> {
        let filter = MeasureFilter::by_id(command.measure_id);

        let mut measure = self
            .repository
            .find_one(&filter)
            .await
            .map_err(|e| storage_fault("measure lookup", e))?
            .ok_or(MeasureFailure::MeasureNotFound)?;

        if let Err(MeasureError::AlreadyConfirmed(id)) = measure.confirm(command.confirmed_value) {
            info!(measure_id = %id, "Rejecting confirmation: already confirmed");
            return Err(MeasureFailure::ConfirmationDuplicate);
        }

        // Only an unconfirmed row may be patched; zero affected rows means a
        // concurrent confirmation got there first.
        let outcome = self
            .repository
            .update(
                &filter.unconfirmed(),
                &MeasurePatch::confirmation(measure.measure_value()),
            )
            .await
            .map_err(|e| storage_fault("measure update", e))?;

        if outcome.affected == 0 {
            warn!(measure_id = %command.measure_id, "Confirmation lost to a concurrent update");
            return Err(MeasureFailure::ConfirmationDuplicate);
        }

        metrics::counter!("measure_confirmed_total").increment(1);
        info!(measure_id = %command.measure_id, value = measure.measure_value(), "Measure confirmed");

        Ok(ConfirmedMeasure { success: true })
    }

    async fn list(
        &self,
        customer_code: &str,
        measure_type: Option<MeasureType>,
    ) -> MeasureResult<CustomerMeasures> {
        let measures = self
            .repository
            .find(&MeasureFilter::by_customer(customer_code, measure_type))
            .await
            .map_err(|e| storage_fault("measure listing", e))?;

        if measures.is_empty() {
            return Err(MeasureFailure::MeasuresNotFound);
        }

        // Derivations are independent; join_all keeps input order.
        let summaries = futures::future::join_all(measures.iter().map(|m| self.summarize(m))).await;
        let measures = summaries.into_iter().collect::<MeasureResult<Vec<_>>>()?;

        Ok(CustomerMeasures {
            customer_code: customer_code.to_string(),
            measures,
        })
    }

    async fn summarize(&self, measure: &Measure) -> MeasureResult<MeasureSummary> {
        let image = decode_image(measure.image_base64()).map_err(|e| internal("image decoding", e))?;
        let image_url = self.url_builder.build_image_url(&image, measure.id).await;

        Ok(MeasureSummary {
            id: measure.id,
            measure_datetime: measure.measure_datetime,
            measure_type: measure.measure_type,
            has_confirmed: measure.has_confirmed(),
            image_url,
        })
    }

    async fn image(&self, measure_id: MeasureId) -> MeasureResult<MeasureImage> {
        let stored = self
            .repository
            .find_image(measure_id)
            .await
            .map_err(|e| storage_fault("image lookup", e))?;

        let bytes = match stored {
            Some(encoded) => decode_image(&encoded).map_err(|e| internal("image decoding", e))?,
            None => {
                warn!(measure_id = %measure_id, "Image requested for unknown measure");
                Vec::new()
            }
        };

        Ok(MeasureImage { bytes })
    }
}

#[async_trait]
impl MeasureService for StandardMeasureService {
    async fn create_measure(&self, command: CreateMeasureCommand) -> MeasureResult<CreatedMeasure> {
        shielded("create_measure", self.create(command)).await
    }

    async fn update_measure(&self, command: ConfirmMeasureCommand) -> MeasureResult<ConfirmedMeasure> {
        shielded("update_measure", self.confirm(command)).await
    }

    async fn get_measures(
        &self,
        customer_code: &str,
        measure_type: Option<MeasureType>,
    ) -> MeasureResult<CustomerMeasures> {
        shielded("get_measures", self.list(customer_code, measure_type)).await
    }

    async fn get_image(&self, measure_id: MeasureId) -> MeasureResult<MeasureImage> {
        shielded("get_image", self.image(measure_id)).await
    }
}

fn internal(stage: &str, err: impl Display) -> MeasureFailure {
    error!("Measure workflow failed during {}: {}", stage, err);
    MeasureFailure::Internal(format!("{}: {}", stage, err))
}

/// Storage details stay in the log; callers only learn which step failed.
fn storage_fault(stage: &str, err: RepositoryError) -> MeasureFailure {
    error!("Measure workflow failed during {}: {}", stage, err);
    MeasureFailure::Internal(format!("{}: storage unavailable", stage))
}

/// Converts a panic inside an operation into an internal failure.
async fn shielded<T>(operation: &str, fut: impl Future<Output = MeasureResult<T>>) -> MeasureResult<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(internal(operation, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_and_codes() {
        assert_eq!(MeasureFailure::DoubleReport.status(), ResultStatus::Conflict);
        assert_eq!(MeasureFailure::DoubleReport.error_code(), "DOUBLE_REPORT");
        assert_eq!(MeasureFailure::MeasureNotFound.status(), ResultStatus::NotFound);
        assert_eq!(MeasureFailure::MeasureNotFound.error_code(), "MEASURE_NOT_FOUND");
        assert_eq!(MeasureFailure::ConfirmationDuplicate.status(), ResultStatus::Conflict);
        assert_eq!(MeasureFailure::ConfirmationDuplicate.error_code(), "CONFIRMATION_DUPLICATE");
        assert_eq!(MeasureFailure::MeasuresNotFound.status(), ResultStatus::NotFound);
        assert_eq!(MeasureFailure::MeasuresNotFound.error_code(), "MEASURES_NOT_FOUND");

        let internal = MeasureFailure::Internal("boom".to_string());
        assert_eq!(internal.status(), ResultStatus::InternalError);
        assert_eq!(internal.status().http_code(), 500);
        assert_eq!(
            internal.body().error_description,
            "Unable to complete the operation. ERROR: boom"
        );
    }

    #[test]
    fn test_storage_fault_hides_backend_detail() {
        let failure = storage_fault(
            "measure insert",
            RepositoryError::Database("password authentication failed for user \"measure\"".to_string()),
        );
        let description = failure.body().error_description;
        assert_eq!(
            description,
            "Unable to complete the operation. ERROR: measure insert: storage unavailable"
        );
        assert!(!description.contains("password"));
    }

    #[tokio::test]
    async fn test_shielded_converts_panic() {
        let fail = true;
        let result: MeasureResult<()> = shielded("op", async move {
            if fail {
                panic!("kaboom");
            }
            Ok(())
        })
        .await;
        match result {
            Err(MeasureFailure::Internal(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_created_measure_wire_shape() {
        let id = MeasureId::new();
        let created = CreatedMeasure {
            image_url: "http://x:1/public/a.png".to_string(),
            measure_value: 7,
            measure_id: id,
        };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["measure_uuid"], id.0.to_string());
        assert_eq!(json["measure_value"], 7);
    }
}
