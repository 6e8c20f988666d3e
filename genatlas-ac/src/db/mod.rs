//! Database access layer for genatlas-ac

pub mod annotations;
pub mod registry;
pub mod statuses;
