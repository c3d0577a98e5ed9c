//! Process-wide resources, created once at startup and passed explicitly
//! to every component instead of living in globals.

use std::sync::Arc;

use glazebid_db::DbPool;

use crate::config::Config;
use crate::pdf::PdfEngine;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub store: Arc<dyn ObjectStore>,
    pub pdf: Arc<dyn PdfEngine>,
}

impl WorkerContext {
    pub fn new(
        config: Config,
        pool: DbPool,
        store: Arc<dyn ObjectStore>,
        pdf: Arc<dyn PdfEngine>,
    ) -> Self {
        WorkerContext {
            config: Arc::new(config),
            pool,
            store,
            pdf,
        }
    }
}
