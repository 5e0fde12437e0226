//! Barbercast API - HTTP surface of the campaign dispatcher
//!
//! This crate provides the dispatch endpoint together with campaign
//! statistics, protection settings, gateway status and health routes.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{AppState, ReadinessCheck};
pub use routes::create_router;
