use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};

use palaver_store::Database;

use crate::auth::TokenService;
use crate::config::ServerConfig;
use crate::gateway::hub::Hub;
use crate::gateway::typing::TypingTracker;

/// Handle to the store. SQLite has a single writer; every store operation
/// goes through this async mutex so handlers can suspend instead of blocking.
#[derive(Clone)]
pub struct Db(Arc<Mutex<Database>>);

impl Db {
    pub fn new(database: Database) -> Self {
        Self(Arc::new(Mutex::new(database)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Database> {
        self.0.lock().await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub hub: Arc<Hub>,
    pub typing: Arc<TypingTracker>,
    pub tokens: TokenService,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, database: Database) -> Self {
        let db = Db::new(database);
        let hub = Arc::new(Hub::new());
        let typing = Arc::new(TypingTracker::new(db.clone(), hub.clone()));
        let tokens = TokenService::new(&config.jwt_secret, db.clone());
        Self {
            db,
            hub,
            typing,
            tokens,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
