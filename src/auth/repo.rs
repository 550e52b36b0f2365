use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    errors::StoreError,
    password::{hash_password_blocking, verify_password_blocking},
    repo_types::{Account, AccountUpdate},
};

/// Persistence for accounts. Implementations hash passwords on write and
/// enforce email uniqueness.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create an account, hashing `password` with a fresh salt.
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<Account, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Apply `changes`; the hash is recomputed only if a new password is given.
    async fn update(&self, id: Uuid, changes: AccountUpdate)
        -> Result<Option<Account>, StoreError>;
}

/// Compare a candidate plaintext against the account's stored hash.
pub async fn compare_password(account: &Account, candidate: &str) -> Result<bool, StoreError> {
    Ok(verify_password_blocking(candidate.to_owned(), account.password_hash.clone()).await?)
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<Account, StoreError> {
        let password_hash = hash_password_blocking(password.to_owned()).await?;
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
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
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                password_hash = COALESCE($3, password_hash),
                updated_at = $4
            WHERE id = $1
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }
}
