//! Error types for the gbackup crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while authenticating against or uploading to Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Credential {} not found", .0.display())]
    CredentialNotFound(PathBuf),

    #[error("Malformed service account credential: {0}")]
    CredentialMalformed(String),

    #[error("File {} not found", .0.display())]
    UploadTargetNotFound(PathBuf),

    #[error("Root not set")]
    RootNotSet,

    #[error("Root {root} not accessible. Check Google Drive permission.")]
    RootInaccessible {
        root: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Update checksum mismatch: expected {expected}, got {actual}")]
    UpdateChecksumMismatch { expected: String, actual: String },

    #[error("Update checksum unavailable: {0}")]
    UpdateChecksumMissing(String),
}

impl DriveError {
    /// Whether the failure happened while obtaining an access token.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            DriveError::JwtError(_) | DriveError::TokenRefreshError(_)
        )
    }

    /// Whether the failure came from the authorization or object-storage transport.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DriveError::HttpError(_)
                | DriveError::ApiError { .. }
                | DriveError::JwtError(_)
                | DriveError::TokenRefreshError(_)
        )
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_inaccessible_keeps_source() {
        let err = DriveError::RootInaccessible {
            root: "folder123".to_string(),
            source: Box::new(DriveError::ApiError {
                status: 404,
                message: "File not found: folder123.".to_string(),
            }),
        };

        assert!(err.to_string().contains("folder123"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("404"));
        assert!(!err.is_remote());
    }

    #[test]
    fn test_is_remote() {
        let api = DriveError::ApiError {
            status: 403,
            message: "quota".to_string(),
        };
        assert!(api.is_remote());
        assert!(DriveError::TokenRefreshError("x".to_string()).is_remote());
        assert!(!DriveError::RootNotSet.is_remote());
        assert!(!DriveError::UploadTargetNotFound(PathBuf::from("a")).is_remote());
    }

    #[test]
    fn test_json_error_has_its_own_kind() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DriveError::from(source);
        assert!(matches!(err, DriveError::JsonError(_)));
        assert!(!err.is_remote());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_is_auth() {
        assert!(DriveError::TokenRefreshError("Status 400".to_string()).is_auth());
        let api = DriveError::ApiError {
            status: 404,
            message: "File not found".to_string(),
        };
        assert!(!api.is_auth());
    }
}
