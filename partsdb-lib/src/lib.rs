#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for partsdb
//!
//! This library holds all the functionality of the partsdb tool, which builds, distributes,
//! synchronizes and queries an offline catalogue of electronic components.
//!
//! # Module Organization
//!
//! - [`encoder`]: Turns per-category source files into three compact, LUT-addressed tables
//! - [`store`]: Local persistence for table blobs, settings and the category/component partitions
//! - [`transport`]: HTTP access to the published artifact and the category index
//! - [`reader`]: Cooperative, cancellable streaming decode of stored table blobs
//! - [`sync`]: Hash-based reconciliation of the local catalog against the server index
//! - [`query`]: Full-text, category and attribute filtering with version-stamped results
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

/// Hash map used throughout the crate for string-keyed lookups.
pub type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;

/// Hash set companion to [`HashMap`].
pub type HashSet<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;

pub mod commands;
pub mod encoder;
pub mod library;
pub mod model;
pub mod progress;
pub mod query;
pub mod reader;
pub mod store;
pub mod sync;
pub mod tables;
pub mod transport;

pub use crate::commands::{Host, run};
