//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the HTTP access core:
//! - Logging and tracing infrastructure
//! - Client configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the auth core depends on. It
//! establishes the logging conventions, the configuration builder with its
//! fail-fast validation, and the event broadcasting used to tell the host
//! about session changes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
