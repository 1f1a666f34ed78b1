//! Error types for the kaiwa application.

use thiserror::Error;

/// A shared error type for the entire kaiwa application.
///
/// Every layer (store, generation client, coordinator, controllers) reports
/// failures through this enum so that the state engine can turn any of them
/// into a user-visible effect without knowing where it came from.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KaiwaError {
    /// User input was rejected before any work was attempted (e.g. blank text).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// An attached image could not be turned into the wire format.
    #[error("Failed to encode image '{path}': {message}")]
    Encode { path: String, message: String },

    /// The persistence medium could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Network-level failure (connection refused, timeout, TLS, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Every credential in the pool was rejected by the service.
    #[error("All {attempts} credentials were rejected by the generation service")]
    AuthExhausted { attempts: usize },

    /// A non-authorization error reported by the remote service.
    #[error("Service error {code}: {message}")]
    Service {
        code: i32,
        status: Option<String>,
        message: String,
    },

    /// The service answered successfully but without usable text.
    #[error("The generation service returned no text")]
    EmptyResponse,

    /// The service body could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KaiwaError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an Encode error
    pub fn encode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a Persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_auth_exhausted(&self) -> bool {
        matches!(self, Self::AuthExhausted { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Human-readable text carried by "show error" effects.
    ///
    /// Keeps internal detail (HTTP bodies, file paths) out of the headline
    /// for the categories a user can act on.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Encode { .. } => "The attached image could not be read.".to_string(),
            Self::Persistence(_) => "Your chat history could not be saved.".to_string(),
            Self::NotFound { entity_type, .. } => format!("The {entity_type} no longer exists."),
            Self::Transport(_) => {
                "Could not reach the generation service. Check your connection.".to_string()
            }
            Self::AuthExhausted { .. } => {
                "None of the configured API keys were accepted.".to_string()
            }
            Self::Service { message, .. } => format!("The generation service failed: {message}"),
            Self::EmptyResponse => "The model returned an empty reply.".to_string(),
            Self::MalformedResponse(_) => {
                "The generation service sent an unreadable reply.".to_string()
            }
            Self::Config(message) => format!("Configuration problem: {message}"),
            Self::Internal(_) => "Something went wrong.".to_string(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for KaiwaError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for KaiwaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("JSON: {err}"))
    }
}

/// A type alias for `Result<T, KaiwaError>`.
pub type Result<T> = std::result::Result<T, KaiwaError>;
