// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer (`measure-core`)
//!
//! The `Measure` aggregate and the contracts of everything the workflow talks
//! to. No I/O happens here.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`measure`] | `Measure`, `MeasureId`, `MeasureType`, `MonthBounds` |
//! | [`repository`] | `MeasureRepository`, filters, patches, `RepositoryError` |
//! | [`vision`] | `ReadingExtractor`, `ImageClassifier`, `Reading`, `VisionError` |
//! | [`config`] | `ServiceConfig` manifest, discovery and validation |

pub mod config;
pub mod measure;
pub mod repository;
pub mod vision;
