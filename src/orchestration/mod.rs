//! # Migration Orchestrators
//!
//! One recipe per legacy source shape. A recipe validates a staged row and
//! then sequences the entity builders for it. Builders log their own
//! failures, so a recipe only decides whether the row as a whole counts as
//! migrated; side effects of earlier steps are never rolled back.
//!
//! [`BatchRunner`] claims rows from the staging tables and drives the recipe
//! matching their source.

pub mod active;
pub mod address_member;
pub mod batch;
pub mod filemaker;
pub mod gift;
pub mod mandate;

pub use active::ActiveMemberMigration;
pub use address_member::{household_name, AddressMemberMigration};
pub use batch::{BatchRunner, BatchSummary};
pub use filemaker::FileMakerMigration;
pub use gift::GiftMigration;
pub use mandate::MandateMigration;

use crate::staging::StagingRow;
use async_trait::async_trait;

/// Validate-then-execute contract shared by every legacy source
#[async_trait]
pub trait SourceMigration: Send + Sync {
    type Row: StagingRow;

    /// Check the row carries what the recipe needs; failures are logged
    async fn validate(&self, row: &Self::Row) -> bool;

    /// Run the recipe for a validated row
    async fn execute(&self, row: &Self::Row) -> bool;

    /// Whether `row` was migrated
    async fn migrate(&self, row: &Self::Row) -> bool {
        if !self.validate(row).await {
            return false;
        }
        self.execute(row).await
    }
}
