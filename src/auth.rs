//! Service account authentication for Google APIs.

use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint, used when the key file names none.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Full Google Drive read/write scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Source of bearer tokens for Drive API requests.
pub trait TokenProvider {
    fn access_token(&self) -> impl Future<Output = Result<String>>;
}

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Authenticator for Google APIs using service account credentials.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<ServiceAccountCredentials>,
    signing_key: Arc<EncodingKey>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

// Key material and tokens stay out of debug output.
impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("client_email", &self.credentials.client_email)
            .field("token_uri", &self.token_uri())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Load a service account key file.
    ///
    /// A missing file is reported as [`DriveError::CredentialNotFound`]; content
    /// that is not JSON, lacks the service account fields or carries a private
    /// key that is not an RSA PEM is [`DriveError::CredentialMalformed`].
    /// Nothing is sent over the network.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DriveError::CredentialNotFound(path.to_path_buf()),
            _ => DriveError::IoError(e),
        })?;
        Self::from_json(&content)
    }

    /// Parse a service account key from its JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(content)
            .map_err(|e| DriveError::CredentialMalformed(e.to_string()))?;

        if credentials.client_email.trim().is_empty() {
            return Err(DriveError::CredentialMalformed(
                "client_email is empty".to_string(),
            ));
        }

        Self::new(credentials)
    }

    /// Create a new authenticator from credentials, parsing the private key.
    pub fn new(credentials: ServiceAccountCredentials) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| DriveError::CredentialMalformed(format!("private_key: {}", e)))?;

        Ok(Self {
            credentials: Arc::new(credentials),
            signing_key: Arc::new(signing_key),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Service account identity the tokens are issued for.
    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                // Add 60 second buffer before expiration
                let buffer = Duration::from_secs(60);
                if token.expires_at > SystemTime::now() + buffer {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn refresh_token(&self) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::TokenRefreshError(e.to_string()))?
            .as_secs();

        let claims = Claims {
            iss: self.credentials.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: self.token_uri().to_string(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let jwt = encode(&header, &claims, &self.signing_key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        debug!("requesting access token for {}", self.credentials.client_email);
        let response = self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }
}

impl TokenProvider for Authenticator {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}

/// A fixed bearer token, for tests and pre-authorized sessions.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
