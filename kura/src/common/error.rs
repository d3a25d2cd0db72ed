//! Common Error Types
//!
//! Query failures with their JSON-RPC error code mapping.

use std::fmt;

/// JSON-RPC error codes
///
/// Standard codes: -32768 to -32000
/// Custom codes: -32099 to -32000
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Standard JSON-RPC errors
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Catalog lookups
    ContentNotFound = -32004,
    AssetNotFound = -32005,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// Application error type with JSON-RPC code
#[derive(Debug)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn content_not_found(id: &str) -> Self {
        Self::new(ErrorCode::ContentNotFound, format!("No content with id {}", id))
    }

    pub fn asset_not_found(id: &str, entry: &str) -> Self {
        Self::new(
            ErrorCode::AssetNotFound,
            format!("Content {} has no asset '{}'", id, entry),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_json_rpc_ranges() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(AppError::invalid_request("x").code.code(), -32600);
        assert_eq!(ErrorCode::ContentNotFound.code(), -32004);
        let err = AppError::content_not_found("abc");
        assert_eq!(err.to_string(), "[-32004] No content with id abc");
    }
}
