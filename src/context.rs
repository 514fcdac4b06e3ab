//! Everything a builder or orchestrator needs for one run, passed explicitly.

use crate::config::{MigrationConfig, ReferenceIds};
use crate::run_log::RunLog;
use crate::store::RecordStore;
use chrono::{Local, NaiveDate};
use std::sync::Arc;

#[derive(Clone)]
pub struct MigrationContext {
    pub store: Arc<dyn RecordStore>,
    pub refs: Arc<ReferenceIds>,
    pub config: Arc<MigrationConfig>,
    pub log: Arc<RunLog>,
    /// Reference date for status and join-date derivation
    pub today: NaiveDate,
}

impl MigrationContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        refs: Arc<ReferenceIds>,
        config: Arc<MigrationConfig>,
        log: Arc<RunLog>,
    ) -> Self {
        Self {
            store,
            refs,
            config,
            log,
            today: Local::now().date_naive(),
        }
    }

    /// Pin "today", for reproducible status derivation
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationContext")
            .field("environment", &self.config.environment)
            .field("today", &self.today)
            .finish()
    }
}
