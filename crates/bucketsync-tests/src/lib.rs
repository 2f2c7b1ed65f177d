//! bucketsync integration test support
//!
//! Shared fixtures for the end-to-end tests in `tests/`: temporary local
//! trees, pre-populated in-memory buckets and store wrappers that interfere
//! with a running sync.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// This module provides common utilities used across all test files
/// to ensure consistency and reduce code duplication.
pub mod test_utils;
