//! Shared HTTP utilities for the profile registry workspace.
//!
//! Provides the structured JSON error bodies and the mapping from domain
//! errors to HTTP status codes used by the api-server.

use domain::{CoreError, ValidationErrors};

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "conflict" => "Resource already exists",
        "validation_failed" => "One or more fields are invalid",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Error body for a rejected form submission, one message per failing field.
///
/// Returns: `{"error": {"code": "validation_failed", "message": "...", "fields": {"<key>": "<message>"}}}`
pub fn json_validation_error(errors: &ValidationErrors) -> serde_json::Value {
    let mut body = json_err("validation_failed");
    body["error"]["fields"] = serde_json::to_value(errors).unwrap_or_default();
    body
}

// ============================================================================
// Domain error mapping
// ============================================================================

/// HTTP status code for a domain error.
pub fn status_for(err: &CoreError) -> u16 {
    match err {
        CoreError::Validation(_) => 400,
        CoreError::NotFound => 404,
        CoreError::AlreadyExists => 409,
        CoreError::Serialization(_) | CoreError::Repository(_) => 500,
    }
}

/// JSON body for a domain error. Internal details are not echoed back.
pub fn error_body(err: &CoreError) -> serde_json::Value {
    match err {
        CoreError::Validation(errors) => json_validation_error(errors),
        CoreError::NotFound => json_err("not_found"),
        CoreError::AlreadyExists => {
            json_error_with_message("conflict", "another user already has this email")
        }
        CoreError::Serialization(_) | CoreError::Repository(_) => json_err("internal"),
    }
}
