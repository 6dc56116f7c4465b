//! Common utilities shared across the profile store crates.
//!
//! This crate provides:
//! - Unified error handling for store and decode failures
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
