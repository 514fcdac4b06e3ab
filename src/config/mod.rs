//! # Migration Configuration
//!
//! Settings for a migration run come from `config/velt-migration.yaml`, with
//! per-environment override sections merged over the defaults. Reference
//! identifiers that live inside the CRM (status ids, relationship types, ...)
//! are not configuration; they are resolved once at startup by
//! [`ReferenceIds::resolve`] and passed explicitly to every component.
//!
//! ```rust,no_run
//! use velt_migration::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let batch = manager.config().batches.leven;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod reference;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use reference::{LocationTypeRef, MembershipTypeRef, ReferenceIds};

/// Largest batch a single invocation may claim
pub const MAX_BATCH_SIZE: u32 = 500;

/// Root configuration structure mirroring velt-migration.yaml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// CiviCRM REST endpoint
    pub crm: CrmConfig,

    /// Legacy staging database
    pub staging: StagingConfig,

    pub logging: LoggingConfig,

    /// Rows claimed per invocation, per legacy source
    pub batches: BatchConfig,

    pub membership: MembershipConfig,

    pub email: EmailConfig,

    pub sepa: SepaConfig,

    pub gifts: GiftConfig,

    /// Post-migration repairs
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Environment this configuration was loaded for
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrmConfig {
    pub base_url: String,
    pub rest_path: String,
    pub api_key: String,
    pub site_key: String,
    pub timeout_ms: u64,
}

impl CrmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StagingConfig {
    pub url: String,
    /// Schema holding the legacy tables (`velt_migratie_2018`)
    pub schema: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Operator run logs (`log_<timestamp>.txt`)
    pub run_log_directory: PathBuf,
    /// JSON tracing output of the binary
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("log")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    pub migratie_adres: u32,
    pub leven: u32,
    pub gratis: u32,
    pub archief: u32,
    pub actief: u32,
    pub mandaat: u32,
    pub giften: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MembershipConfig {
    /// Start date used when a source row carries no end date
    pub default_start_date: NaiveDate,
    pub address_member_type: String,
    pub lifetime_member_type: String,
    pub free_member_type: String,
    pub archive_member_type: String,
    /// Membership custom field holding the legacy member number
    pub historical_id_field: String,
    /// Household custom field holding the legacy branch id
    pub household_branch_field: String,
    /// `source` written on migrated membership contributions
    pub payment_source: String,
    /// Year of the migrated membership payments; month and day follow the
    /// membership start
    #[serde(default = "default_payment_year")]
    pub payment_year: i32,
}

fn default_payment_year() -> i32 {
    2017
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    /// Placeholder domain used by the legacy export
    pub legacy_domain: String,
    pub replacement_domain: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SepaConfig {
    pub creditor_id: i64,
    pub cycle_day: u32,
    pub frequency_interval: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GiftConfig {
    pub financial_type: String,
    pub review_group_title: String,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Membership custom field for "seasons by post"
    pub seasons_post_field: String,
    /// Membership custom field recording how the member signed up
    pub origin_field: String,
    pub origin_option_group: String,
    /// Origin written by `correct-defaults`
    pub default_origin: String,
    /// Memberships deleted per `clear-memberships` invocation
    pub clear_batch_size: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            seasons_post_field: "velt_seizoenen_post".to_string(),
            origin_field: "vld_herkomst".to_string(),
            origin_option_group: "velt_herkomst_lidmaatschap".to_string(),
            default_origin: "Eigen_aanmelding".to_string(),
            clear_batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl MigrationConfig {
    /// Validate configuration consistency
    pub fn validate(&self) -> ConfigResult<()> {
        let batches = [
            ("batches.migratie_adres", self.batches.migratie_adres),
            ("batches.leven", self.batches.leven),
            ("batches.gratis", self.batches.gratis),
            ("batches.archief", self.batches.archief),
            ("batches.actief", self.batches.actief),
            ("batches.mandaat", self.batches.mandaat),
            ("batches.giften", self.batches.giften),
        ];
        for (field, size) in batches {
            if size == 0 || size > MAX_BATCH_SIZE {
                return Err(ConfigurationError::invalid_value(
                    field,
                    size.to_string(),
                    format!("batch size must be between 1 and {MAX_BATCH_SIZE}"),
                ));
            }
        }

        let type_names = [
            ("membership.address_member_type", &self.membership.address_member_type),
            ("membership.lifetime_member_type", &self.membership.lifetime_member_type),
            ("membership.free_member_type", &self.membership.free_member_type),
            ("membership.archive_member_type", &self.membership.archive_member_type),
        ];
        for (field, name) in type_names {
            if name.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(field, "membership"));
            }
        }

        if !(1..=28).contains(&self.sepa.cycle_day) {
            return Err(ConfigurationError::invalid_value(
                "sepa.cycle_day",
                self.sepa.cycle_day.to_string(),
                "cycle day must fall within 1..=28",
            ));
        }

        if self.sepa.frequency_interval == 0 {
            return Err(ConfigurationError::invalid_value(
                "sepa.frequency_interval",
                "0",
                "frequency interval must be positive",
            ));
        }

        let clear = self.maintenance.clear_batch_size;
        if clear == 0 || clear > MAX_BATCH_SIZE {
            return Err(ConfigurationError::invalid_value(
                "maintenance.clear_batch_size",
                clear.to_string(),
                format!("batch size must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }

        if self.crm.base_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("crm.base_url", "crm"));
        }

        Ok(())
    }

    /// Membership type names that must resolve at startup
    pub fn membership_type_names(&self) -> Vec<&str> {
        let mut names = vec![
            self.membership.address_member_type.as_str(),
            self.membership.lifetime_member_type.as_str(),
            self.membership.free_member_type.as_str(),
            self.membership.archive_member_type.as_str(),
        ];
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
pub(crate) use crate::test_helpers::test_config;
