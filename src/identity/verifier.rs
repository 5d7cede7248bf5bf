//! Bearer credential verification against the external identity provider.
//! The provider owns all token cryptography; this side only forwards the
//! token and classifies the outcome.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Distinct from other rejections so clients can refresh and retry.
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    Invalid(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError>;
}

// --- HTTP-backed verifier (token introspection endpoint) ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectResponse {
    #[serde(alias = "sub")]
    subject_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct IntrospectRejection {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Providers signal expiry with a code suffix (e.g. `auth/id-token-expired`);
/// everything else on a rejection status is a plain invalid token.
fn classify_rejection(rej: &IntrospectRejection) -> VerifyError {
    if rej.code.to_ascii_lowercase().ends_with("expired") {
        VerifyError::Expired
    } else if rej.message.is_empty() {
        VerifyError::Invalid(rej.code.clone())
    } else {
        VerifyError::Invalid(format!("{}: {}", rej.code, rej.message))
    }
}

pub struct HttpVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVerifier {
    pub fn new<S: Into<String>>(endpoint: S) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpVerifier { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl IdentityVerifier for HttpVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            let body: IntrospectResponse = resp
                .json()
                .await
                .map_err(|e| VerifyError::Unavailable(format!("bad introspection body: {}", e)))?;
            return Ok(VerifiedIdentity { subject_id: body.subject_id, email: body.email });
        }
        if status.is_client_error() {
            let rej: IntrospectRejection = resp.json().await.unwrap_or_default();
            return Err(classify_rejection(&rej));
        }
        Err(VerifyError::Unavailable(format!("introspection status {}", status)))
    }
}

// --- Fixed-map verifier for local wiring and tests ---

/// Verifier with a fixed token table. Useful where no identity provider is
/// reachable; unknown tokens are rejected, listed tokens resolve to their
/// identity, and tokens marked expired report the expiry signal.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
    expired: HashSet<String>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        StaticVerifier::default()
    }

    pub fn grant<S: Into<String>>(mut self, token: S, subject_id: S, email: S) -> Self {
        self.tokens.insert(
            token.into(),
            VerifiedIdentity { subject_id: subject_id.into(), email: email.into() },
        );
        self
    }

    pub fn expire<S: Into<String>>(mut self, token: S) -> Self {
        self.expired.insert(token.into());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        if self.expired.contains(token) {
            return Err(VerifyError::Expired);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VerifyError::Invalid("unknown token".into()))
    }
}
