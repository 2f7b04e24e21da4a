//! HTTP surface: health, status, catalog, and preference management.

pub mod error;
pub mod routes;

pub use routes::create_router;
