//! Process-wide handle threaded into every subsystem at startup.
//!
//! Resolves the "no ambient singletons" design note: the database pool,
//! configuration, and the shared trade broadcast sender are constructed once
//! in `main` and passed explicitly from here, rather than read from statics.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::EngineConfig;

#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub db: PgPool,
}

impl EngineContext {
    pub fn new(config: EngineConfig, db: PgPool) -> Self {
        Self {
            config: Arc::new(config),
            db,
        }
    }
}
