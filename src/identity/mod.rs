//! Identity verification and the request authenticator.
//! Keep the public surface thin and split implementation across sub-modules.

mod authenticator;
mod context;
mod verifier;

pub use authenticator::Authenticator;
pub use context::AuthContext;
pub use verifier::{HttpVerifier, IdentityVerifier, StaticVerifier, VerifiedIdentity, VerifyError};
