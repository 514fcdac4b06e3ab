#![allow(clippy::doc_markdown)] // Allow technical terms like CiviCRM, FileMaker in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Velt Migration
//!
//! One-time migration of the legacy Velt membership administration into
//! CiviCRM.
//!
//! ## Overview
//!
//! The legacy exports are loaded into staging tables (`migratie_adres`,
//! `migratie_persoon`, `leven`, `gratis`, `archief`, `actief`, `mandaat`,
//! `giften`). Each batch claims a number of unprocessed rows, marks them
//! processed and runs the recipe for their source. A recipe maps the flat
//! row onto households, individuals, organizations, addresses, e-mail,
//! phones, memberships, payments, mandates and gifts, created through the
//! CRM's record API.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration and the CRM reference identifiers
//! - [`store`] - Record store client (CiviCRM API v3)
//! - [`staging`] - Legacy staging tables
//! - [`builders`] - One builder per CRM entity, with duplicate avoidance
//! - [`orchestration`] - Per-source recipes and the batch driver
//! - [`maintenance`] - Post-migration repairs
//! - [`run_log`] - Append-only operator log of a run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use velt_migration::config::{ConfigManager, ReferenceIds};
//! use velt_migration::orchestration::BatchRunner;
//! use velt_migration::staging::{MySqlStaging, SourceKind};
//! use velt_migration::store::CiviRestStore;
//! use velt_migration::{MigrationContext, RunLog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = Arc::new(manager.config().clone());
//!
//! let store = Arc::new(CiviRestStore::new(&config.crm)?);
//! let refs = Arc::new(ReferenceIds::resolve(store.as_ref(), &config).await?);
//! let log = Arc::new(RunLog::create_in(&config.logging.run_log_directory)?);
//! let staging = Arc::new(MySqlStaging::connect(&config.staging).await?);
//!
//! let runner = BatchRunner::new(MigrationContext::new(store, refs, config, log), staging);
//! let summary = runner.run(SourceKind::Lifetime, None).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod builders;
pub mod config;
pub mod context;
pub mod error;
pub mod location_type;
pub mod logging;
pub mod maintenance;
pub mod membership_status;
pub mod orchestration;
pub mod run_log;
pub mod staging;
pub mod store;
pub mod test_helpers;

pub use config::{ConfigManager, MigrationConfig, ReferenceIds};
pub use context::MigrationContext;
pub use error::{MigrationError, Result};
pub use location_type::{EntityKind, LocationTypeAllocator};
pub use membership_status::{resolve_status, MembershipStatus};
pub use orchestration::{BatchRunner, BatchSummary, SourceMigration};
pub use run_log::{RunLog, Severity};
pub use staging::{SourceKind, StagingStore};
pub use store::{RecordStore, StoreError};
