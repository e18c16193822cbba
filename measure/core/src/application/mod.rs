// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod measure_service;

// Re-export use cases for convenience
pub use measure_service::{
    ConfirmMeasureCommand, ConfirmedMeasure, CreateMeasureCommand, CreatedMeasure, CustomerMeasures,
    ErrorBody, MeasureFailure, MeasureImage, MeasureResult, MeasureService, MeasureSummary,
    ResultStatus, StandardMeasureService,
};
