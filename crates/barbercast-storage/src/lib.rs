//! Barbercast Storage - Database access for the campaign dispatcher
//!
//! This crate owns the Postgres pool, the embedded migrations, the row
//! models and the repositories the dispatcher reads and writes through.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
