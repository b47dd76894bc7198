use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::hash_password;
use super::repo::{DuplicateEmail, UserStore};
use super::repo_types::{AuthRecord, Gender, NewUser, User, UserRole, UserStatus};

/// `UserStore` kept in a map, for tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    /// Inserts a user with a real argon2 hash of `password`.
    pub fn seed(&self, email: &str, password: &str, status: UserStatus) -> User {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password(password).expect("hash seed password"),
            first_name: None,
            last_name: None,
            display_name: None,
            gender: Gender::Unknown,
            avatar: None,
            birthday: None,
            role: UserRole::User,
            status,
            created_at: now,
            updated_at: now,
        };
        self.users.write().unwrap().insert(user.id, user.clone());
        user
    }

    pub fn set_status(&self, id: Uuid, status: UserStatus) {
        if let Some(user) = self.users.write().unwrap().get_mut(&id) {
            user.status = status;
        }
    }

    pub fn set_password(&self, id: Uuid, password: &str) {
        if let Some(user) = self.users.write().unwrap().get_mut(&id) {
            user.password_hash = hash_password(password).expect("hash new password");
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn find_auth_record(&self, id: Uuid) -> anyhow::Result<Option<AuthRecord>> {
        Ok(self.users.read().unwrap().get(&id).map(AuthRecord::from))
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.write().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(DuplicateEmail.into());
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            display_name: new.display_name,
            gender: new.gender,
            avatar: None,
            birthday: None,
            role: new.role,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credentials_lookup_normalizes_email_and_checks_password() {
        let store = MemoryUserStore::default();
        let seeded = store.seed("chef@example.com", "pa55word!", UserStatus::Active);

        let found = store
            .find_by_credentials("  Chef@Example.com ", "pa55word!")
            .await
            .unwrap()
            .expect("user should match");
        assert_eq!(found.id, seeded.id);

        assert!(store
            .find_by_credentials("chef@example.com", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_credentials("nobody@example.com", "pa55word!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_both_verify_once() {
        use crate::auth::password::VERIFY_CALLS;

        let store = MemoryUserStore::default();
        store.seed("chef@example.com", "pa55word!", UserStatus::Active);
        let calls = || VERIFY_CALLS.with(|c| c.get());

        let before = calls();
        let miss = store
            .find_by_credentials("nobody@example.com", "pa55word!")
            .await
            .unwrap();
        assert!(miss.is_none());
        assert_eq!(calls(), before + 1);

        let before = calls();
        let wrong = store
            .find_by_credentials("chef@example.com", "not-it")
            .await
            .unwrap();
        assert!(wrong.is_none());
        assert_eq!(calls(), before + 1);
    }

    #[tokio::test]
    async fn auth_record_projects_id_hash_and_status() {
        let store = MemoryUserStore::default();
        let seeded = store.seed("a@b.com", "secret-pw", UserStatus::Inactive);
        let record = store.find_auth_record(seeded.id).await.unwrap().unwrap();
        assert_eq!(record.id, seeded.id);
        assert_eq!(record.password_hash, seeded.password_hash);
        assert_eq!(record.status, UserStatus::Inactive);
        assert!(store.find_auth_record(Uuid::new_v4()).await.unwrap().is_none());
    }
}
