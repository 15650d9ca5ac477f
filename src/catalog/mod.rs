//! Decoded repository manifests and the aggregated package catalog
//!
//! - [`model`]: repositories, packages and package versions
//! - [`manifest`]: decoding of repository manifest JSON
//! - [`index`]: first-wins aggregation across repositories

pub mod index;
pub mod manifest;
pub mod model;
