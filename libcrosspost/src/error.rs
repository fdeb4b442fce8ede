//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(PlatformError::Authentication(_)) => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Media(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Identity resolution failed: {0}")]
    IdentityResolution(String),

    #[error("Media upload failed: {0}")]
    MediaUpload(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

/// Failures while turning an input image into an uploadable encoding
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image cannot fit under {limit} bytes (smallest encoding was {smallest} bytes)")]
    TooLarge { limit: u64, smallest: u64 },
}

/// Classify an HTTP status returned by a platform API
///
/// `fallback` decides the variant used when the status carries no specific
/// meaning (e.g. `PlatformError::Posting` while creating a post).
pub(crate) fn classify_http_status(
    status: u16,
    message: String,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(message),
        400 | 422 => PlatformError::Validation(message),
        429 => PlatformError::RateLimit(message),
        500..=599 => PlatformError::Network(message),
        _ => fallback(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = CrosspostError::Platform(PlatformError::Authentication(
            "Invalid app password".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let posting = CrosspostError::Platform(PlatformError::Posting("boom".to_string()));
        assert_eq!(posting.exit_code(), 1);

        let config = CrosspostError::Config(ConfigError::MissingField("bluesky".to_string()));
        assert_eq!(config.exit_code(), 1);

        let media = CrosspostError::Media(MediaError::TooLarge {
            limit: 10,
            smallest: 20,
        });
        assert_eq!(media.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosspostError::Platform(PlatformError::Posting(
            "Bluesky rejected record".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Posting failed: Bluesky rejected record"
        );

        let error = CrosspostError::Config(ConfigError::MissingField("mastodon".to_string()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: mastodon"
        );
    }

    #[test]
    fn test_media_too_large_formatting() {
        let error = MediaError::TooLarge {
            limit: 1_000_000,
            smallest: 1_200_000,
        };
        let message = error.to_string();
        assert!(message.contains("1000000"));
        assert!(message.contains("1200000"));
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let err: CrosspostError = PlatformError::Network("down".to_string()).into();
        assert!(matches!(
            err,
            CrosspostError::Platform(PlatformError::Network(ref msg)) if msg == "down"
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_classify_http_status() {
        let f = PlatformError::Posting;
        assert!(matches!(
            classify_http_status(401, "x".into(), f),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_http_status(400, "x".into(), f),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            classify_http_status(429, "x".into(), f),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            classify_http_status(502, "x".into(), f),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            classify_http_status(404, "x".into(), PlatformError::IdentityResolution),
            PlatformError::IdentityResolution(_)
        ));
    }
}
