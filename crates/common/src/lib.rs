//! Common utilities and types shared across the dual-session client crates.

#![warn(clippy::pedantic)]

/// Module for common data types (identifiers, stream and session kinds)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging of session tokens
pub mod secret;
