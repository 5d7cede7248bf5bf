/// How a request was authorized. The tier stays inspectable downstream:
/// a `Param` subject was merely asserted by the client and allowlist-checked,
/// never cryptographically verified, and handlers must be able to tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Verified bearer credential.
    Token { subject_id: String, email: String },
    /// Bare client-supplied identifier, accepted only on the capture route.
    Param { subject_id: String },
}

impl AuthContext {
    pub fn subject_id(&self) -> &str {
        match self {
            AuthContext::Token { subject_id, .. } | AuthContext::Param { subject_id } => subject_id,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, AuthContext::Token { .. })
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            AuthContext::Token { email, .. } => Some(email.as_str()),
            AuthContext::Param { .. } => None,
        }
    }
}
