// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`measure-core`)
//!
//! HTTP surface that translates requests into `MeasureService` calls.
//! Workflow outcomes are mapped to status codes here; the rules themselves
//! live in `crate::application`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router: upload, confirm, list, public image, health |
//! | [`validation`] | Request payload checks producing `INVALID_DATA` / `INVALID_TYPE` |

pub mod api;
pub mod validation;
