pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod session;

pub use db::DbPool;

use config::Config;
use session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let sessions = SessionStore::new(db.clone(), config.auth.session_ttl_hours);
        Self {
            config,
            db,
            sessions,
        }
    }
}
