//! # Test Helpers
//!
//! In-memory adapters for the record store and the staging tables, plus
//! shared fixtures. Used by the unit tests in this crate and by the
//! integration tests under `tests/`.

pub mod fixtures;
pub mod memory_staging;
pub mod memory_store;

pub use fixtures::{
    seed_reference_data, test_config, SeededReferenceData, TestEnvironment,
    BANK_TRANSFER_INSTRUMENT, COMPLETED_CONTRIBUTION_STATUS, FAX_TYPE, IBAN_REFERENCE_TYPE,
    PHONE_TYPE, SEPA_RCUR_INSTRUMENT,
};
pub use memory_staging::{AddressMemberOutcome, InMemoryStaging};
pub use memory_store::InMemoryStore;
