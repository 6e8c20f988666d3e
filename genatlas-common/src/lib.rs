//! # GeneAtlas Common Library
//!
//! Shared code for the GeneAtlas curation services including:
//! - Database schema and initialization
//! - Domain models (roles, review states, task states)
//! - Canonical job-parameter hashing
//! - Configuration loading
//! - Error taxonomy

pub mod config;
pub mod db;
pub mod error;
pub mod params;

pub use error::{Error, Result};
