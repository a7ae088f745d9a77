use reqwest::StatusCode;
use std::fmt;

/// Main error type for the notification inbox
#[derive(Debug)]
pub enum InboxError {
    // HTTP and API errors
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    ServerError { status: u16, message: String },

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Realtime communication errors
    WebSocketConnection(String),
    WebSocketMessage(String),
    ChannelClosed,

    // Configuration and setup errors
    InvalidConfiguration(String),
}

impl fmt::Display for InboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            InboxError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            InboxError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            InboxError::NotFound(msg) => write!(f, "Not found: {}", msg),
            InboxError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }

            InboxError::NetworkTimeout => write!(f, "Network request timed out"),
            InboxError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            InboxError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            InboxError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            InboxError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            InboxError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            InboxError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            InboxError::WebSocketConnection(msg) => write!(f, "WebSocket connection error: {}", msg),
            InboxError::WebSocketMessage(msg) => write!(f, "WebSocket message error: {}", msg),
            InboxError::ChannelClosed => write!(f, "Push channel closed"),

            InboxError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for InboxError {}

// Convenience type alias for Results
pub type InboxResult<T> = Result<T, InboxError>;

impl From<reqwest::Error> for InboxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InboxError::NetworkTimeout
        } else if err.is_connect() {
            InboxError::NetworkConnection(err.to_string())
        } else if err.is_decode() {
            InboxError::JsonParsing(err.to_string())
        } else {
            InboxError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for InboxError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            InboxError::JsonParsing(err.to_string())
        } else {
            InboxError::JsonSerialization(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for InboxError {
    fn from(err: chrono::ParseError) -> Self {
        InboxError::InvalidFormat(format!("Invalid date/time format: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for InboxError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => InboxError::ChannelClosed,
            WsError::Io(e) => InboxError::WebSocketConnection(e.to_string()),
            WsError::Url(e) => InboxError::InvalidUrl(e.to_string()),
            other => InboxError::WebSocketMessage(other.to_string()),
        }
    }
}

// Helper functions for creating common errors
impl InboxError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        InboxError::NotFound(resource.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        InboxError::InvalidConfiguration(msg.into())
    }

    /// Maps a non-success HTTP response onto the error taxonomy.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            StatusCode::BAD_REQUEST => InboxError::BadRequest(message),
            StatusCode::UNAUTHORIZED => InboxError::Unauthorized(message),
            StatusCode::FORBIDDEN => InboxError::Forbidden(message),
            StatusCode::NOT_FOUND => InboxError::NotFound(message),
            _ => InboxError::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Transport-level failures (as opposed to the server rejecting the call).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            InboxError::NetworkTimeout
                | InboxError::NetworkConnection(_)
                | InboxError::HttpClient(_)
                | InboxError::WebSocketConnection(_)
                | InboxError::ChannelClosed
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, InboxError::Unauthorized(_) | InboxError::Forbidden(_))
    }
}
