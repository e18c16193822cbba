// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Measure CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Wires configuration, storage, vision provider and HTTP
//!   server together for the `measure` binary

pub mod commands;
pub mod server;
