use std::fmt;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use super::dto::TokenResponse;
use super::jwt::JwtKeys;
use super::repo::UserStore;
use super::repo_types::{AuthRecord, UserStatus};
use crate::error::AuthError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct PresentedRefreshToken(pub String);

impl fmt::Debug for PresentedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresentedRefreshToken(<redacted>)")
    }
}

/// How the caller proves who they are.
#[derive(Debug)]
pub enum Identity {
    ByCredentials(Credentials),
    ByRefreshToken(PresentedRefreshToken),
}

impl Identity {
    pub fn flow(&self) -> &'static str {
        match self {
            Identity::ByCredentials(_) => "credentials",
            Identity::ByRefreshToken(_) => "refresh_token",
        }
    }

    fn resolver(&self) -> &dyn IdentityResolver {
        match self {
            Identity::ByCredentials(c) => c,
            Identity::ByRefreshToken(t) => t,
        }
    }
}

/// A user resolved from an identity, plus the refresh token to hand back.
#[derive(Debug)]
pub struct Resolved {
    pub user: AuthRecord,
    pub refresh_token: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, users: &dyn UserStore, keys: &JwtKeys) -> Result<Resolved, AuthError>;
}

#[async_trait]
impl IdentityResolver for Credentials {
    async fn resolve(&self, users: &dyn UserStore, keys: &JwtKeys) -> Result<Resolved, AuthError> {
        let user = users
            .find_by_credentials(&self.email, &self.password)
            .await?
            .ok_or(AuthError::ParamInvalidValue)?;
        let refresh_token = keys.sign_refresh(user.id, &user.password_hash)?;
        Ok(Resolved {
            user: AuthRecord::from(&user),
            refresh_token,
        })
    }
}

#[async_trait]
impl IdentityResolver for PresentedRefreshToken {
    /// The presented token is echoed back unchanged; refresh tokens are not rotated.
    async fn resolve(&self, users: &dyn UserStore, keys: &JwtKeys) -> Result<Resolved, AuthError> {
        let detail = keys.refresh_token_detail(&self.0)?;
        let user = users
            .find_auth_record(detail.user_id)
            .await?
            .ok_or(AuthError::ParamInvalidValue)?;
        if detail.fingerprint != JwtKeys::fingerprint(&user.password_hash) {
            return Err(AuthError::PasswordChanged { user_id: user.id });
        }
        Ok(Resolved {
            user,
            refresh_token: self.0.clone(),
        })
    }
}

pub fn ensure_active(user: &AuthRecord) -> Result<(), AuthError> {
    if user.status != UserStatus::Active {
        return Err(AuthError::AccountNotActive { user_id: user.id });
    }
    Ok(())
}

/// Resolve the identity, check the account, mint a new access token.
pub async fn exchange(
    users: &dyn UserStore,
    keys: &JwtKeys,
    identity: Identity,
) -> Result<TokenResponse, AuthError> {
    let flow = identity.flow();
    let Resolved {
        user,
        refresh_token,
    } = identity.resolver().resolve(users, keys).await?;
    debug!(user_id = %user.id, flow, "identity resolved");

    ensure_active(&user)?;

    let access = keys.sign_access(user.id, &user.password_hash)?;
    info!(user_id = %user.id, flow, expires_at = %access.expires_at, "access token issued");
    Ok(TokenResponse {
        access_token: access.token,
        refresh_token,
    })
}
