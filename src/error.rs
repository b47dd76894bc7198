//! Rejections of the token endpoint.
//!
//! Every failure of the token pipeline becomes an [`AuthError`], and every
//! [`AuthError`] becomes the same `403 Forbidden` body. The kind and context
//! are logged here and never sent to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::jwt::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("request body is not a valid token request: {0}")]
    MalformedBody(String),

    #[error("missing parameter: {0}")]
    ParamMissing(&'static str),

    #[error("invalid authentication values")]
    ParamInvalidValue,

    #[error(transparent)]
    InvalidToken(#[from] TokenError),

    #[error("account {user_id} is not active")]
    AccountNotActive { user_id: Uuid },

    #[error("password of {user_id} changed after the refresh token was issued")]
    PasswordChanged { user_id: Uuid },

    #[error("credential store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedBody(_) => "malformed_body",
            AuthError::ParamMissing(_) => "param_missing",
            AuthError::ParamInvalidValue => "param_invalid_value",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::AccountNotActive { .. } => "account_not_active",
            AuthError::PasswordChanged { .. } => "password_changed",
            AuthError::Store(_) => "store",
        }
    }
}

/// The only body a rejected token request ever gets.
#[derive(Debug, Serialize)]
pub struct ForbiddenBody {
    pub error: &'static str,
    pub message: &'static str,
}

pub const FORBIDDEN: ForbiddenBody = ForbiddenBody {
    error: "forbidden",
    message: "Forbidden",
};

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Store(e) => error!(kind = self.kind(), error = %e, "token request failed"),
            _ => warn!(kind = self.kind(), error = %self, "token request rejected"),
        }
        (StatusCode::FORBIDDEN, Json(FORBIDDEN)).into_response()
    }
}
