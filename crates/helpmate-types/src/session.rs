//! Client-side session store.
//!
//! Holds the display fields a front end needs (username, user id, avatar),
//! read straight out of the bearer token. The signature is NOT checked here:
//! the server verifies every request, this only decodes for display.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

/// Subset of the token payload used for display. Tokens from the auth
/// service carry the id either as `sub` or as `userId`.
#[derive(Debug, Deserialize)]
struct DisplayClaims {
    #[serde(default)]
    username: Option<String>,
    #[serde(default, alias = "userId")]
    sub: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSession {
    pub username: String,
    pub user_id: String,
    pub profile_picture: String,
}

impl UserSession {
    /// Builds a session from a stored token, or an empty one when there is
    /// no token yet.
    pub fn from_stored_token(token: Option<&str>) -> Result<Self, SessionError> {
        let mut session = Self::default();
        if let Some(token) = token {
            session.set_from_token(token)?;
        }
        Ok(session)
    }

    /// Replaces the display fields with the ones in `token`. An empty token is
    /// a no-op.
    pub fn set_from_token(&mut self, token: &str) -> Result<(), SessionError> {
        if token.is_empty() {
            return Ok(());
        }

        let claims = decode_unverified(token)?;
        self.username = claims.username.unwrap_or_default();
        self.user_id = claims.sub.unwrap_or_default();
        self.profile_picture = claims.image.unwrap_or_default();
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_signed_in(&self) -> bool {
        !self.user_id.is_empty()
    }
}

fn decode_unverified(token: &str) -> Result<DisplayClaims, SessionError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<DisplayClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}
