//! Annotation review workflow
//!
//! `engine` enforces the review state machine, `propagator` keeps the
//! derived gene/genome flags exact after every status write, `roles` holds
//! the operation capability table.

pub mod engine;
pub mod propagator;
pub mod roles;

pub use engine::StatusEngine;
