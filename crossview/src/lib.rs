//! Crossview - tile-based street-level imagery pipeline
//!
//! This library acquires geo-referenced imagery metadata for spatial tiles,
//! classifies the records against reference building footprints and builds
//! per-tile manifests that reduce into a global index.
//!
//! # Components
//!
//! ```text
//! TileIndex ──► AcquisitionEngine ──► derive ──► SpatialFilter ──► manifest
//!     │                                                               │
//!     └──────────────────── PipelineOrchestrator ─────────────────────┘
//!                                                                     ▼
//!                                                          aggregate → index.json
//! ```
//!
//! The [`pipeline::PipelineOrchestrator`] drives the per-tile steps in a fixed
//! order, skipping any step whose output artifact already exists.

pub mod acquisition;
pub mod config;
pub mod coord;
pub mod crs;
pub mod derive;
pub mod filter;
pub mod geometry;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod store;
pub mod tiles;

/// Crate version, recorded in generated artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
