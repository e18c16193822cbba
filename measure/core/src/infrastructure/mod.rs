// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod image;
pub mod repositories;
pub mod vision;

pub use image::{decode_image, ImageUrlBuilder, InferImageClassifier};
