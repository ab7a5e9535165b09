// Copyright 2026 ShopVision Contributors
// SPDX-License-Identifier: MIT

//! ShopVision runtime library: sitemap discovery, product page extraction,
//! image embedding and idempotent product storage.
//!
//! This library crate exposes the core modules for integration testing.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod extraction;
pub mod imaging;
pub mod pipeline;
pub mod product;
pub mod store;

pub use pipeline::{Pipeline, RunReport};
pub use product::{ProductRecord, RawProduct};
