pub mod config;
pub mod yaml_include;

/// Common utilities shared across the grocer workspace
///
/// This crate provides shared functionality used by the `store` engine and
/// the `grocer` application crate, including:
///
/// - Configuration loading (YAML with `!include` composition)
/// - Shared test utilities, error types and assertion macros

// Test helpers module - available for both development and test builds
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::{TestError, TestResult};
