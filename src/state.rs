use std::sync::Arc;

use crate::auth::services::ensure_superuser;
use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryRepository, PgRepository, Repository};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let repo = match config.store {
            StoreBackend::Postgres => {
                let pg = PgRepository::connect(&config.database_url, config.max_connections).await?;
                if let Err(e) = pg.migrate().await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(pg) as Arc<dyn Repository>
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on restart");
                Arc::new(MemoryRepository::new()) as Arc<dyn Repository>
            }
        };

        let purged = repo
            .purge_expired_revocations(time::OffsetDateTime::now_utc())
            .await?;
        tracing::debug!(purged, "expired revocations purged at startup");

        if let Some(seed) = &config.superuser {
            ensure_superuser(repo.as_ref(), seed).await?;
        }

        Ok(Self::from_parts(repo, config))
    }

    pub fn from_parts(repo: Arc<dyn Repository>, config: Arc<AppConfig>) -> Self {
        Self { repo, config }
    }

    /// In-memory store and a fixed JWT config.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: String::new(),
            max_connections: 1,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            superuser: None,
        });

        let repo = Arc::new(MemoryRepository::new()) as Arc<dyn Repository>;
        Self::from_parts(repo, config)
    }
}
