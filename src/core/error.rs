//! Typed error handling for the dispatch engine
//!
//! Every failure the engine can produce is one of the category enums below,
//! wrapped in [`RestError`]. The HTTP boundary turns a `RestError` into a
//! status code and the uniform `{errorCode, errorMessage}` body.
//!
//! # Error Categories
//!
//! - [`DispatchError`]: path resolution and state machine failures
//! - [`ShapeError`]: failures while turning results into a response
//! - [`RequestError`]: malformed or rejected requests
//! - [`StorageError`]: failures reported by storage collaborators
//! - [`ConfigError`]: configuration parsing and validation
//!
//! # Example
//!
//! ```rust,ignore
//! match dispatcher.dispatch(&view, &caller).await {
//!     Err(RestError::Dispatch(DispatchError::NotFound { kind, id })) => {
//!         println!("{} {} is not visible", kind, id);
//!     }
//!     Err(e) if e.is_retryable() => println!("retry with a smaller page"),
//!     Err(e) => eprintln!("Other error: {}", e),
//!     Ok(outcome) => { /* ... */ }
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error type of the engine
#[derive(Debug, Error)]
pub enum RestError {
    /// Path resolution and dispatch errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Response shaping errors
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Malformed or rejected requests
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Storage collaborator errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body sent to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub error_code: String,
    /// Human-readable error message
    pub error_message: String,
}

impl RestError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestError::Dispatch(e) => e.status_code(),
            RestError::Shape(e) => e.status_code(),
            RestError::Request(e) => e.status_code(),
            RestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RestError::Dispatch(e) => e.error_code(),
            RestError::Shape(e) => e.error_code(),
            RestError::Request(e) => e.error_code(),
            RestError::Storage(_) => "STORAGE_ERROR",
            RestError::Config(_) => "CONFIG_ERROR",
            RestError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request, e.g. with a smaller page
    pub fn is_retryable(&self) -> bool {
        matches!(self, RestError::Shape(ShapeError::ResourceExhausted { .. }))
    }

    /// Convert to an error body
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error_code: self.error_code().to_string(),
            error_message: self.to_string(),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors raised while resolving the path and walking the dispatch stack
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No prefix of the resource path maps to a provider
    #[error("No provider matches resource path '{path}'")]
    BadPath { path: String },

    /// The method/segment combination is illegal in the current state
    #[error("Cannot apply {action} on a {state} stack")]
    BadStateTransition { state: &'static str, action: String },

    /// Convention-based operation lookup failed
    #[error("Operation '{method}' not found on {target}")]
    MethodNotFound { method: String, target: String },

    /// A required operation parameter was not supplied
    #[error("Missing required argument '{argument}' for '{operation}'")]
    MissingArgument { operation: String, argument: String },

    /// The id (or name) is unknown or not readable by the caller
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::BadPath { .. } => StatusCode::NOT_FOUND,
            DispatchError::BadStateTransition { .. } => StatusCode::BAD_REQUEST,
            DispatchError::MethodNotFound { .. } => StatusCode::BAD_REQUEST,
            DispatchError::MissingArgument { .. } => StatusCode::BAD_REQUEST,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::BadPath { .. } => "BAD_PATH",
            DispatchError::BadStateTransition { .. } => "BAD_STATE_TRANSITION",
            DispatchError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            DispatchError::MissingArgument { .. } => "MISSING_ARGUMENT",
            DispatchError::NotFound { .. } => "NOT_FOUND",
        }
    }
}

// =============================================================================
// Shape Errors
// =============================================================================

/// Errors raised while shaping a dispatch result into a response body
#[derive(Debug, Error)]
pub enum ShapeError {
    /// The value has no representation in a response
    #[error("Cannot represent {what} in a REST response")]
    Unrepresentable { what: String },

    /// The memory guard tripped
    #[error("Memory usage {used} bytes exceeds the critical value of {critical} bytes")]
    ResourceExhausted { used: u64, critical: u64 },
}

impl ShapeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShapeError::Unrepresentable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ShapeError::ResourceExhausted { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ShapeError::Unrepresentable { .. } => "UNREPRESENTABLE",
            ShapeError::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
        }
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to the inbound request itself
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URI does not follow `{base}v{N}/{resource}`
    #[error("Invalid resource path '{uri}'")]
    InvalidResourcePath { uri: String },

    /// Unbalanced `fields`/`expand` expression
    #[error("Invalid terse object string '{input}'")]
    InvalidTerseString { input: String },

    /// Filter value that cannot be interpreted
    #[error("Invalid filter on '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    /// Argument that cannot be normalized to the declared parameter type
    #[error("Invalid value for argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    /// Requested response type other than JSON
    #[error("Unsupported response type '{response_type}'")]
    UnsupportedResponseType { response_type: String },

    /// Body that is not valid JSON
    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    /// Missing or rejected credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// HTTP method the engine does not dispatch
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidResourcePath { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidTerseString { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidFilter { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            RequestError::UnsupportedResponseType { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidResourcePath { .. } => "INVALID_RESOURCE_PATH",
            RequestError::InvalidTerseString { .. } => "INVALID_TERSE_STRING",
            RequestError::InvalidFilter { .. } => "INVALID_FILTER",
            RequestError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            RequestError::UnsupportedResponseType { .. } => "UNSUPPORTED_RESPONSE_TYPE",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by storage collaborators
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend failure
    #[error("Storage backend error: {message}")]
    Backend { message: String },

    /// A store lock was poisoned
    #[error("Storage lock poisoned: {message}")]
    Lock { message: String },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config{}: {message}", file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    #[error("IO error: {message}")]
    IoError { message: String },
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        RestError::Request(RequestError::InvalidBody {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for RestError {
    fn from(err: serde_yaml::Error) -> Self {
        RestError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for RestError {
    fn from(err: std::io::Error) -> Self {
        RestError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

/// Collaborators return `anyhow::Result`; typed errors they raise are recovered
impl From<anyhow::Error> for RestError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RestError>() {
            Ok(rest) => rest,
            Err(err) => match err.downcast::<DispatchError>() {
                Ok(dispatch) => RestError::Dispatch(dispatch),
                Err(err) => match err.downcast::<RequestError>() {
                    Ok(request) => RestError::Request(request),
                    Err(err) => RestError::Storage(StorageError::Backend {
                        message: err.to_string(),
                    }),
                },
            },
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for engine operations
pub type RestResult<T> = Result<T, RestError>;

// =============================================================================
// Tests
// =============================================================================
