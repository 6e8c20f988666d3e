//! HTTP API handlers for genatlas-ac

pub mod auth;
pub mod health;
pub mod registry;
pub mod review;
pub mod tasks;

pub use auth::CurrentUser;
pub use health::health_routes;
