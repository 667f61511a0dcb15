// 🔑 Credentials - Service account key + OAuth access tokens
//
// Reads a service-account JSON key and trades a signed JWT assertion for a
// short-lived bearer token (OAuth 2.0 JWT bearer grant).

use crate::error::CredentialError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const AMBIENT_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: u64 = 3600;

/// The configured path when it exists, otherwise the ambient one.
pub fn resolve_credentials_path(configured: &Path) -> PathBuf {
    let ambient = std::env::var_os(AMBIENT_CREDENTIALS_ENV).map(PathBuf::from);
    resolve_credentials_path_with(configured, ambient)
}

fn resolve_credentials_path_with(configured: &Path, ambient: Option<PathBuf>) -> PathBuf {
    if configured.exists() {
        return configured.to_path_buf();
    }
    match ambient {
        Some(path) if path.exists() => path,
        // Keep the configured path so the NotFound error names it
        _ => configured.to_path_buf(),
    }
}

// ============================================================================
// SERVICE ACCOUNT KEY
// ============================================================================

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            return Err(CredentialError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|reason| CredentialError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_json(raw: &str) -> Result<Self, String> {
        let key: ServiceAccountKey = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if key.client_email.trim().is_empty() {
            return Err("client_email is empty".to_string());
        }
        if !(key.private_key.contains("BEGIN") && key.private_key.contains("PRIVATE KEY")) {
            return Err("private_key is not a PEM private key".to_string());
        }
        Ok(key)
    }

    /// Signed RS256 assertion requesting `scope`.
    pub fn assertion(&self, scope: &str) -> Result<String, CredentialError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }

    /// Exchange a fresh assertion for a BigQuery-scoped access token.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<AccessToken, CredentialError> {
        let assertion = self.assertion(BIGQUERY_SCOPE)?;

        let response = http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| CredentialError::TokenExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::TokenExchange(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::TokenExchange(e.to_string()))?;

        tracing::debug!(
            client = %self.client_email,
            expires_in = token.expires_in.unwrap_or(0),
            "access token issued"
        );
        Ok(AccessToken(token.access_token))
    }
}

// ============================================================================
// ACCESS TOKEN
// ============================================================================

/// Opaque bearer token. Never printed.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}
