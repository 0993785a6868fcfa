//! # Dispatch Testing Utils
//!
//! Shared testing utilities for the field service dispatch system.
//! This crate provides test data builders with sensible defaults that
//! can be used across all other crates in the workspace.
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! dispatch-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;

pub use builders::*;
