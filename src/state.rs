//! Shared engine state: pool, resolved dialect, schema cache and authorization hook.

use crate::config::EngineSettings;
use crate::dialect::{Dialect, SqlDialect};
use crate::error::AppError;
use crate::introspect::Introspector;
use crate::service::{AllowAll, Authorizer};
use crate::store;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineState {
    pub pool: AnyPool,
    /// Chosen once from settings or the connection's backend.
    pub dialect: Dialect,
    pub introspector: Arc<Introspector>,
    pub settings: Arc<EngineSettings>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl EngineState {
    /// Open a pool for `settings.database_url` and prepare the bookkeeping tables.
    pub async fn connect(settings: EngineSettings) -> Result<Self, AppError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        Self::from_pool(pool, settings).await
    }

    /// Wrap an existing pool. The Any drivers must already be installed.
    pub async fn from_pool(pool: AnyPool, settings: EngineSettings) -> Result<Self, AppError> {
        let mut conn = pool.acquire().await?;
        let dialect = match settings.driver.as_deref() {
            Some(name) => Dialect::resolve(name),
            None => Dialect::resolve(conn.backend_name()),
        };
        store::ensure_sys_tables(&mut conn, dialect.rules()).await?;
        drop(conn);
        tracing::info!(dialect = dialect.name(), "engine ready");
        Ok(EngineState {
            pool,
            dialect,
            introspector: Arc::new(Introspector::new(dialect)),
            settings: Arc::new(settings),
            authorizer: Arc::new(AllowAll),
        })
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn rules(&self) -> &'static dyn SqlDialect {
        self.dialect.rules()
    }
}
