use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("expected {expected:?} token, got {actual:?}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("token lifetime of {0:?} is out of range")]
    ExpiryOutOfRange(Duration),
}

/// A freshly minted token and the moment it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// What a verified refresh token says about its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshDetail {
    pub user_id: Uuid,
    pub fingerprint: String,
}

/// Signing and verification keys together with the configured claims.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: minutes(config.ttl_minutes),
            refresh_ttl: minutes(config.refresh_ttl_minutes),
        }
    }

    /// Hex SHA-256 of the stored password hash. Changes whenever the password does.
    pub fn fingerprint(password_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn sign_at(
        &self,
        user_id: Uuid,
        password_hash: &str,
        kind: TokenKind,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = TimeDuration::try_from(ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or(TokenError::ExpiryOutOfRange(ttl))?;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            fp: Self::fingerprint(password_hash),
        };
        let token =
            encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(IssuedToken { token, expires_at })
    }

    pub fn sign_access(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<IssuedToken, TokenError> {
        self.sign_at(user_id, password_hash, TokenKind::Access, OffsetDateTime::now_utc())
    }

    pub fn sign_refresh(&self, user_id: Uuid, password_hash: &str) -> Result<String, TokenError> {
        self.sign_at(user_id, password_hash, TokenKind::Refresh, OffsetDateTime::now_utc())
            .map(|issued| issued.token)
    }

    /// Checks signature, expiry, issuer and audience. Does not look at `kind`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn refresh_token_detail(&self, token: &str) -> Result<RefreshDetail, TokenError> {
        let claims = self.verify_kind(token, TokenKind::Refresh)?;
        Ok(RefreshDetail {
            user_id: claims.sub,
            fingerprint: claims.fp,
        })
    }
}

fn minutes(value: i64) -> Duration {
    Duration::from_secs((value.max(0) as u64).saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    const HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA";

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let issued = keys.sign_access(user_id, HASH).expect("sign access");
        let claims = keys.verify_access(&issued.token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.fp, JwtKeys::fingerprint(HASH));
        assert_eq!(claims.exp as i64, issued.expires_at.unix_timestamp());
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn refresh_detail_carries_user_and_fingerprint() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id, HASH).expect("sign refresh");
        let detail = keys.refresh_token_detail(&token).expect("refresh detail");
        assert_eq!(
            detail,
            RefreshDetail {
                user_id,
                fingerprint: JwtKeys::fingerprint(HASH),
            }
        );
    }

    #[test]
    fn fingerprint_tracks_password_hash() {
        assert_eq!(JwtKeys::fingerprint(HASH), JwtKeys::fingerprint(HASH));
        assert_ne!(JwtKeys::fingerprint(HASH), JwtKeys::fingerprint("other-hash"));
        assert_eq!(JwtKeys::fingerprint(HASH).len(), 64);
    }

    #[test]
    fn refresh_detail_rejects_access_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = keys.sign_access(Uuid::new_v4(), HASH).expect("sign access");
        let err = keys.refresh_token_detail(&issued.token).unwrap_err();
        assert!(matches!(
            err,
            TokenError::WrongKind {
                expected: TokenKind::Refresh,
                actual: TokenKind::Access
            }
        ));
    }

    #[test]
    fn verify_access_rejects_refresh_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign_refresh(Uuid::new_v4(), HASH).expect("sign refresh");
        assert!(matches!(
            keys.verify_access(&token),
            Err(TokenError::WrongKind { .. })
        ));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign_refresh(Uuid::new_v4(), HASH).expect("sign");
        assert!(matches!(bad_keys.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let ours = make_keys("our-secret", "iss", "aud");
        let theirs = make_keys("their-secret", "iss", "aud");
        let token = theirs.sign_refresh(Uuid::new_v4(), HASH).expect("sign");
        assert!(matches!(
            ours.refresh_token_detail(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign_refresh(Uuid::new_v4(), HASH).expect("sign");
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let other = keys.sign_refresh(Uuid::new_v4(), HASH).expect("sign");
        parts[1] = other.split('.').nth(1).unwrap().to_string();
        let forged = parts.join(".");
        assert!(keys.refresh_token_detail(&forged).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(matches!(
            keys.refresh_token_detail("R1"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - TimeDuration::days(30);
        let issued = keys
            .sign_at(Uuid::new_v4(), HASH, TokenKind::Refresh, long_ago)
            .expect("sign");
        assert!(issued.expires_at < OffsetDateTime::now_utc());
        assert!(matches!(
            keys.refresh_token_detail(&issued.token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn oversized_lifetime_is_an_error_not_a_panic() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: i64::MAX,
            refresh_ttl_minutes: 60,
        });
        assert!(matches!(
            keys.sign_access(Uuid::new_v4(), HASH),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
        assert!(keys.sign_refresh(Uuid::new_v4(), HASH).is_ok());
    }
}
