use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    jwt::TokenService,
    memory::InMemoryCredentialStore,
    repo::{CredentialStore, PgCredentialStore},
};
use crate::config::{AppConfig, StoreBackend};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Open the configured store and build the token service.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let accounts = match config.store {
            StoreBackend::Postgres => Self::connect_postgres(&config).await?,
            StoreBackend::Memory => {
                tracing::warn!("using in-memory account store; accounts are lost on restart");
                Arc::new(InMemoryCredentialStore::new()) as Arc<dyn CredentialStore>
            }
        };
        Ok(Self::from_parts(Arc::new(config), accounts))
    }

    async fn connect_postgres(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
        let db = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        tracing::info!("connected to database");
        Ok(Arc::new(PgCredentialStore::new(db)))
    }

    pub fn from_parts(config: Arc<AppConfig>, accounts: Arc<dyn CredentialStore>) -> Self {
        let tokens = Arc::new(TokenService::new(&config.jwt));
        Self {
            config,
            accounts,
            tokens,
        }
    }

    /// State backed by the in-memory store and default JWT settings.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: String::new(),
            database_max_connections: 1,
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                ..Default::default()
            },
        });
        Self::from_parts(config, Arc::new(InMemoryCredentialStore::new()))
    }
}
