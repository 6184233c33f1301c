//! bookshelf: a small book catalog web application with accounts and favorites.
//!
//! Anyone can browse and search the catalog. Signed-in readers keep a list of
//! favorite books, and administrators manage books (with cover images) and
//! user accounts.
//!
//! # Features
//!
//! - Book catalog with title/author search and genre filter
//! - Cover image uploads served from a local directory
//! - Cookie sessions backed by the database
//! - Client and admin roles, with admin registration behind a shared code
//! - Per-user favorites
//! - Catalog statistics as JSON and a health probe

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Catalog queries and favorites.
pub mod library;
/// HTTP server.
pub mod server;
/// Cover image storage.
pub mod uploads;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
