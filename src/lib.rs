//! Storage and domain logic for a bilingual (Arabic/English) job board.
//!
//! Listings, likes, comments and accounts live in a single SQLite file.
//! The `souq` binary exposes every operation on the command line.

pub mod auth;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod likes;
pub mod models;
pub mod query;
pub mod sitemap;
pub mod slug;
pub mod sync;
pub mod validate;

pub use db::Database;
pub use error::{AppError, Result};
