//! Common Utilities
//!
//! Shared error types and path conventions.

pub mod error;
pub mod paths;

pub use error::{AppError, ErrorCode};
pub use paths::{canonical_path, is_package_file, staging_path};

/// Application result type
pub type AppResult<T> = Result<T, AppError>;
