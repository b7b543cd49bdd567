//! Shared types, errors, and configuration for Outlay.
//!
//! This crate provides common pieces used across all other crates:
//! - Money rounding and currency codes
//! - Application-wide error types
//! - Configuration management
//! - Session token signing
//! - SMTP email transport

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod jwt;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
