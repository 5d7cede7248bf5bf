//! Per-request authentication: bearer credential first, and on the capture
//! route a fallback to a bare client-supplied identifier. Either path ends
//! in an allowlist check before a context is issued.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tracing::debug;

use crate::allowlist::AllowlistCache;
use crate::error::AppError;

use super::context::AuthContext;
use super::verifier::{IdentityVerifier, VerifyError};

#[derive(Clone)]
pub struct Authenticator {
    verifier: Arc<dyn IdentityVerifier>,
    allowlist: AllowlistCache,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, allowlist: AllowlistCache) -> Self {
        Authenticator { verifier, allowlist }
    }

    fn gate_allowlist(&self, subject_id: &str) -> Result<(), AppError> {
        if !self.allowlist.is_allowed(subject_id) {
            return Err(AppError::forbidden("access_denied", "access denied: not on allowlist"));
        }
        Ok(())
    }

    /// Standard protected-route path: bearer credential required.
    pub async fn require_token(&self, headers: &HeaderMap) -> Result<AuthContext, AppError> {
        let Some(token) = bearer_token(headers) else {
            return Err(AppError::auth("missing_token", "missing or invalid token"));
        };
        let identity = match self.verifier.verify(token).await {
            Ok(identity) => identity,
            Err(VerifyError::Expired) => {
                return Err(AppError::auth("token_expired", "token expired"))
            }
            Err(VerifyError::Invalid(reason)) => {
                debug!("token rejected: {}", reason);
                return Err(AppError::auth("invalid_token", "missing or invalid token"));
            }
            Err(VerifyError::Unavailable(detail)) => {
                return Err(AppError::upstream("identity_unavailable", detail.as_str()))
            }
        };
        self.gate_allowlist(&identity.subject_id)?;
        Ok(AuthContext::Token { subject_id: identity.subject_id, email: identity.email })
    }

    /// Capture-route path: token first, then the identifier parameter.
    ///
    /// A present-but-failing bearer credential does not short-circuit to
    /// rejection; the parameter path is still tried. A verified subject that
    /// fails the allowlist check is rejected outright (falling through to
    /// the same allowlist would not change the outcome).
    pub async fn token_or_param(
        &self,
        headers: &HeaderMap,
        param_subject: Option<&str>,
    ) -> Result<AuthContext, AppError> {
        if let Some(token) = bearer_token(headers) {
            match self.verifier.verify(token).await {
                Ok(identity) => {
                    self.gate_allowlist(&identity.subject_id)?;
                    return Ok(AuthContext::Token {
                        subject_id: identity.subject_id,
                        email: identity.email,
                    });
                }
                Err(err) => {
                    debug!("bearer verification failed, trying identifier parameter: {}", err);
                }
            }
        }
        if let Some(subject_id) = param_subject.map(str::trim).filter(|s| !s.is_empty()) {
            self.gate_allowlist(subject_id)?;
            return Ok(AuthContext::Param { subject_id: subject_id.to_string() });
        }
        Err(AppError::auth("auth_required", "authentication required"))
    }
}
