use anyhow::Context;
use serde::Deserialize;

/// One year. Longer lifetimes are almost certainly a unit mistake.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "recipebook".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "recipebook-users".into()),
            ttl_minutes: minutes_from_env("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: minutes_from_env("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        jwt.validate()?;
        Ok(Self { database_url, jwt })
    }
}

impl JwtConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.secret.trim().is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&self.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
        );
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&self.refresh_ttl_minutes),
            "JWT_REFRESH_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
        );
        Ok(())
    }
}

fn minutes_from_env(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
