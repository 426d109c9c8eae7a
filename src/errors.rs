use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const NETWORK_ALERT: &str =
    "Unable to reach the inventory server. Check your connection and try again.";

/// Error body returned by the inventory backend on failure.
///
/// The backend is not consistent about the field it uses, so every known
/// spelling is accepted.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ErrorResponse {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .or(self.msg)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }
}

/// Coarse classification used to decide how a failure is shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure or timeout
    Network,
    /// Client-side check failed before any request was sent
    Validation,
    /// Uploaded spreadsheet could not be parsed
    Csv,
    /// The backend refused the request
    BusinessRule,
    /// Credentials missing, expired or revoked
    Auth,
    /// Misuse of the session or unexpected local failure
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Business-rule rejection; the message is the backend's, verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("CSV error: {0}")]
    CsvError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        ServiceError::ValidationError(messages.join("; "))
    }
}

impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        match err.position() {
            Some(pos) => ServiceError::CsvError(format!("line {}: {}", pos.line(), err)),
            None => ServiceError::CsvError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::SerializationError(format!("Unexpected response body: {}", err))
        } else if let Some(status) = err.status() {
            ServiceError::from_status(status, None)
        } else {
            ServiceError::NetworkError(err.to_string())
        }
    }
}

impl ServiceError {
    /// Maps a non-success HTTP status and its raw body to an error.
    /// This is the single source of truth for status-to-error mapping.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(ErrorResponse::into_message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && !trimmed.starts_with('<')).then(|| trimmed.to_string())
            });
        Self::from_status(status, message)
    }

    pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::BAD_REQUEST
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY => Self::Rejected(message),
            other => Self::ServerError {
                status: other.as_u16(),
                message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError(_) => ErrorKind::Network,
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::CsvError(_) => ErrorKind::Csv,
            Self::Unauthorized(_) => ErrorKind::Auth,
            Self::NotFound(_) | Self::Conflict(_) | Self::Rejected(_) | Self::ServerError { .. } => {
                ErrorKind::BusinessRule
            }
            Self::UnsupportedOperation(_)
            | Self::InvalidState(_)
            | Self::SerializationError(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// True when the backend reported that the record changed underneath us.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Text shown to the operator in the blocking alert.
    /// Backend messages pass through unchanged; transport details do not.
    pub fn alert_message(&self) -> String {
        match self {
            Self::NetworkError(_) => NETWORK_ALERT.to_string(),
            Self::Rejected(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Conflict(msg) => format!("{} (refresh the list and try again)", msg),
            Self::ServerError { message, .. } => message.clone(),
            Self::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            Self::ValidationError(msg)
            | Self::CsvError(msg)
            | Self::UnsupportedOperation(msg)
            | Self::InvalidState(msg) => msg.clone(),
            Self::SerializationError(_) | Self::Io(_) | Self::Other(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
