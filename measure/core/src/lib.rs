// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Measure Core
//!
//! Records utility-meter (water/gas) readings submitted as photographs,
//! extracts the reading through an external vision model, rejects duplicate
//! submissions per customer / meter type / month and allows a one-time human
//! confirmation of the extracted value.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, measure workflow, storage and vision adapters,
//!   HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
