use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{PublicUser, RegisterRequest, RegisterResponse, TokenRequest, TokenResponse},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::hash_password,
        repo::{normalize_email, DuplicateEmail},
        repo_types::{Gender, NewUser, User, UserRole, UserStatus},
        services::{exchange, is_valid_email, Identity},
    },
    error::AuthError,
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(issue_token))
        .route("/auth/register", post(register))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// Log in with email + password, or trade a refresh token for a new access token.
///
/// Every failure, including a body that is not JSON, is answered with the
/// same 403.
#[instrument(skip_all, fields(flow = tracing::field::Empty))]
pub async fn issue_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let Json(payload) = payload.map_err(|e| AuthError::MalformedBody(e.body_text()))?;
    let identity = Identity::try_from(payload)?;
    tracing::Span::current().record("flow", identity.flow());

    let keys = JwtKeys::from_ref(&state);
    let tokens = exchange(state.users.as_ref(), &keys, identity).await?;
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.chars().count() < MIN_PASSWORD_CHARS {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match state.users.find_by_email(&email).await {
        Ok(Some(_)) => {
            warn!(email = %email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(internal());
        }
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        internal()
    })?;

    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            first_name: payload.first_name,
            last_name: payload.last_name,
            display_name: payload.display_name,
            gender: Gender::default(),
            role: UserRole::User,
            status: UserStatus::Active,
        })
        .await
        .map_err(create_failed)?;

    let keys = JwtKeys::from_ref(&state);
    let access = keys.sign_access(user.id, &user.password_hash).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        internal()
    })?;
    let refresh_token = keys.sign_refresh(user.id, &user.password_hash).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        internal()
    })?;

    info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            access_token: access.token,
            refresh_token,
            user: PublicUser::from(&user),
        }),
    ))
}

/// Profile of the caller. Tokens issued before a password change or for a
/// disabled account are refused.
#[instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, (StatusCode, String)> {
    let unauthorized = || (StatusCode::UNAUTHORIZED, "User not found".to_string());

    let user = state
        .users
        .find_by_id(auth.user_id)
        .await
        .map_err(|e| {
            error!(error = %e, "find_by_id failed");
            internal()
        })?
        .ok_or_else(|| {
            warn!("user not found");
            unauthorized()
        })?;

    if user.status != UserStatus::Active {
        warn!(status = user.status.as_str(), "inactive user presented access token");
        return Err(unauthorized());
    }
    if auth.fingerprint != JwtKeys::fingerprint(&user.password_hash) {
        warn!("access token predates password change");
        return Err(unauthorized());
    }

    Ok(Json(user))
}

fn internal() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
}

/// A unique-email race lost to a concurrent registration is still a conflict.
fn create_failed(e: anyhow::Error) -> (StatusCode, String) {
    if e.is::<DuplicateEmail>() {
        warn!("email already registered");
        return (StatusCode::CONFLICT, "Email already registered".into());
    }
    error!(error = %e, "create user failed");
    internal()
}
