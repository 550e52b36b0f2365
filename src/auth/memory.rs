use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    errors::StoreError,
    password::hash_password_blocking,
    repo::CredentialStore,
    repo_types::{Account, AccountUpdate},
};

/// Process-local store. Uniqueness is checked under the same write lock as the insert.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<Account, StoreError> {
        // hash before taking the lock
        let password_hash = hash_password_blocking(password.to_owned()).await?;

        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let account = Account {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            email: email.to_owned(),
            password_hash,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let password_hash = match changes.password {
            Some(plain) => Some(hash_password_blocking(plain).await?),
            None => None,
        };

        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            account.name = name;
        }
        if let Some(hash) = password_hash {
            account.password_hash = hash;
        }
        account.updated_at = OffsetDateTime::now_utc();
        Ok(Some(account.clone()))
    }
}
