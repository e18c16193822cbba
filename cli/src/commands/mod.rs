// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the measure CLI

pub mod config;
pub mod serve;
pub mod update;

pub use self::config::ConfigCommand;
pub use self::update::UpdateCommand;
