use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserStore, UserStore},
};
use crate::config::{AppConfig, JwtConfig};
use crate::db;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await;

        let users = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        Ok(Self::from_parts(users, &config.jwt))
    }

    pub fn from_parts(users: Arc<dyn UserStore>, jwt: &JwtConfig) -> Self {
        Self {
            users,
            keys: JwtKeys::from_config(jwt),
        }
    }

    #[cfg(test)]
    pub fn fake(users: Arc<crate::auth::memory::MemoryUserStore>) -> Self {
        let jwt = JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        };
        Self::from_parts(users, &jwt)
    }
}
