//! Error types for the pastebin service

use thiserror::Error;

/// Result type alias for pastebin operations
pub type Result<T> = std::result::Result<T, PasteError>;

/// Error types that can occur while admitting, storing or serving content
#[derive(Error, Debug, Clone)]
pub enum PasteError {
    #[error("Rate limited: too many requests for {method} from {client}")]
    RateLimited { method: String, client: String },

    #[error("Declared content length {declared} exceeds limit of {limit} bytes")]
    PayloadTooLarge { declared: u64, limit: u64 },

    #[error("Request body exceeded limit of {limit} bytes while reading")]
    BodyTooLarge { limit: u64 },

    #[error("No content stored under key {0}")]
    NotFound(String),

    #[error("Key {0} already exists")]
    KeyCollision(String),

    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Storage read error: {0}")]
    StorageRead(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Rate limiter error: {0}")]
    RateLimiter(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for PasteError {
    fn from(err: std::io::Error) -> Self {
        PasteError::IoError(err.to_string())
    }
}

impl PasteError {
    /// Convert error to HTTP status code
    ///
    /// Admission rejections keep their own status (429, 413), a missing key is
    /// 404, and everything that went wrong on our side is a plain 500.
    pub fn to_http_status(&self) -> u16 {
        match self {
            PasteError::RateLimited { .. } => 429,
            PasteError::PayloadTooLarge { .. } => 413,
            PasteError::BodyTooLarge { .. } => 413,
            PasteError::NotFound(_) => 404,
            PasteError::BodyRead(_) => 400,

            PasteError::KeyCollision(_) => 500,
            PasteError::StorageWrite(_) => 500,
            PasteError::StorageRead(_) => 500,
            PasteError::Decompression(_) => 500,
            PasteError::RateLimiter(_) => 500,
            PasteError::ConfigError(_) => 500,
            PasteError::IoError(_) => 500,
            PasteError::InternalError(_) => 500,
        }
    }

    /// Message that is safe to send to the client
    ///
    /// Storage and decompression failures never leak their cause; the detail
    /// only ends up in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            PasteError::RateLimited { .. } => "Rate Limited: Too many requests",
            PasteError::PayloadTooLarge { .. } | PasteError::BodyTooLarge { .. } => {
                "Content too large"
            }
            PasteError::NotFound(_) => "Not found",
            PasteError::BodyRead(_) => "Error reading request body",
            PasteError::KeyCollision(_) | PasteError::StorageWrite(_) => "Error storing content",
            PasteError::StorageRead(_) => "Error reading content",
            PasteError::Decompression(_) => "Error decompressing content",
            PasteError::RateLimiter(_)
            | PasteError::ConfigError(_)
            | PasteError::IoError(_)
            | PasteError::InternalError(_) => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_statuses() {
        let err = PasteError::RateLimited {
            method: "POST".to_string(),
            client: "unknown".to_string(),
        };
        assert_eq!(err.to_http_status(), 429);
        assert_eq!(err.public_message(), "Rate Limited: Too many requests");

        let err = PasteError::PayloadTooLarge { declared: 11, limit: 10 };
        assert_eq!(err.to_http_status(), 413);
        assert_eq!(err.public_message(), "Content too large");
    }

    #[test]
    fn test_storage_errors_do_not_leak() {
        let err = PasteError::StorageWrite("UNIQUE constraint failed: content.key".to_string());
        assert_eq!(err.to_http_status(), 500);
        assert_eq!(err.public_message(), "Error storing content");

        let err = PasteError::KeyCollision("abcd1234".to_string());
        assert_eq!(err.public_message(), "Error storing content");
    }

    #[test]
    fn test_not_found() {
        let err = PasteError::NotFound("zzzzzzzz".to_string());
        assert_eq!(err.to_http_status(), 404);
        assert_eq!(err.public_message(), "Not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: PasteError = io.into();
        assert!(matches!(err, PasteError::IoError(_)));
        assert_eq!(err.to_http_status(), 500);
    }
}
