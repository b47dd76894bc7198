use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{User, UserRole};
use super::services::{Credentials, Identity, PresentedRefreshToken};
use crate::error::AuthError;

/// Body of `POST /auth/token`. Either a refresh token or email + password.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<TokenRequest> for Identity {
    type Error = AuthError;

    /// A non-empty refresh token takes precedence over credentials.
    fn try_from(req: TokenRequest) -> Result<Self, Self::Error> {
        if let Some(token) = present(req.refresh_token) {
            return Ok(Identity::ByRefreshToken(PresentedRefreshToken(token)));
        }
        let email = present(req.email).ok_or(AuthError::ParamMissing("email"))?;
        // Whitespace is a legal password; only an empty one counts as missing.
        let password = req
            .password
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::ParamMissing("password"))?;
        Ok(Identity::ByCredentials(Credentials { email, password }))
    }
}

/// Response of `POST /auth/token`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Request body for user registration.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Response returned after registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: UserRole,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }
}
