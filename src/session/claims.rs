use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// User role carried by the session token, gating admin-only actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Unknown,
}

impl Role {
    pub fn from_user_type(user_type: &str) -> Self {
        match user_type {
            "admin" => Role::Admin,
            "user" => Role::User,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims payload of the backend-issued bearer token.
///
/// The client never verifies the signature; it only inspects the claims
/// to derive the role and to drop tokens that have already expired.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as seconds since the epoch. Tokens without one never expire.
    pub exp: Option<i64>,
    #[serde(rename = "tipoUsuario")]
    pub user_type: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl Claims {
    pub fn role(&self) -> Option<Role> {
        self.user_type.as_deref().map(Role::from_user_type)
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.exp {
            Some(exp) => exp <= now.timestamp(),
            None => false,
        }
    }
}

/// Decode the claims payload of a `header.payload.signature` token.
///
/// A token that does not split into three parts or whose payload is not
/// base64url JSON is malformed; callers treat that exactly like having
/// no token at all.
pub fn decode_claims(token: &str) -> ClientResult<Claims> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ClientError::BadRequest("malformed token".into())),
    };

    // Issuers differ on padding; the unpadded alphabet plus a trim
    // accepts both.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| ClientError::BadRequest("malformed token payload".into()))?;

    Ok(serde_json::from_slice(&bytes)?)
}
