//! Personalized timeline service
//!
//! Ranks posts from a viewer's circles, groups, connections and the public feed,
//! pages them with opaque cursors and caches assembled pages per viewer.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
