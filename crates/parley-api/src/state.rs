use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    /// Run a store-bound operation off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Store(anyhow!("worker task failed: {}", e))
            })?
    }
}
