use std::sync::Arc;

use crate::{
    auth::SessionKeys,
    config::Config,
    database::{RedisStore, init_redis},
    error::AppError,
    notifier::Notifier,
    store::SyncStore,
};

pub struct AppState {
    pub config: Config,
    pub notifier: Notifier,
    pub sessions: SessionKeys,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>, AppError> {
        let config = Config::load();

        let connection = init_redis(&config.redis_url).await?;
        let store = Arc::new(RedisStore::new(connection, &config.namespace));

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn SyncStore>) -> Arc<Self> {
        let notifier = Notifier::new(store, config.event_limit);
        let sessions = SessionKeys::new(&config.session_secret);

        Arc::new(Self {
            config,
            notifier,
            sessions,
        })
    }
}
