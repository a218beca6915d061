//! Liyaqa REST API: axum routes over the domain services, API-key and
//! platform-token authentication, and domain error mapping.

#![warn(clippy::unwrap_used)]

pub mod auth;
pub mod billing_rest;
pub mod directory_rest;
pub mod marketing_rest;
pub mod organization_rest;
pub mod platform_rest;
pub mod rest;
pub mod server;
pub mod shop_rest;
pub mod team_rest;

pub use rest::{ApiError, AppState};
pub use server::{build_router, ApiServer};
