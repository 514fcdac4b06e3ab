//! # Legacy Staging Tables
//!
//! The legacy exports were loaded into relational staging tables (schema
//! `velt_migratie_2018`), one per source format. Each table carries a
//! `processed` flag (`migrated` for `migratie_adres`) and a natural key used
//! to claim rows and write outcomes back.
//!
//! [`StagingStore`] is the seam between the batch driver and whatever holds
//! those tables: [`mysql::MySqlStaging`] in production,
//! `test_helpers::InMemoryStaging` in tests.

pub mod mysql;

use crate::error::{MigrationError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

pub use mysql::MySqlStaging;

/// One legacy source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// `migratie_adres`: address-based members with persons in `migratie_persoon`
    AddressMember,
    /// `leven`: lifetime members (FileMaker export)
    Lifetime,
    /// `gratis`: free and exchange members (FileMaker export)
    Free,
    /// `archief`: archived members (FileMaker export)
    Archive,
    /// `actief`: start/end date corrections for active members
    Active,
    /// `mandaat`: direct debit mandates
    Mandate,
    /// `giften`: gifts
    Gift,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::AddressMember,
        SourceKind::Lifetime,
        SourceKind::Free,
        SourceKind::Archive,
        SourceKind::Active,
        SourceKind::Mandate,
        SourceKind::Gift,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            SourceKind::AddressMember => "migratie_adres",
            SourceKind::Lifetime => "leven",
            SourceKind::Free => "gratis",
            SourceKind::Archive => "archief",
            SourceKind::Active => "actief",
            SourceKind::Mandate => "mandaat",
            SourceKind::Gift => "giften",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            SourceKind::AddressMember => "lidmaatschap_id",
            // a member can have several gifts
            SourceKind::Gift => "id",
            _ => "lidnummer",
        }
    }

    pub fn processed_column(&self) -> &'static str {
        match self {
            SourceKind::AddressMember => "migrated",
            _ => "processed",
        }
    }

    /// Operator-facing name used in batch summaries
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::AddressMember => "velt leden",
            SourceKind::Lifetime => "velt leden voor het leven",
            SourceKind::Free => "velt gratis & ruil leden",
            SourceKind::Archive => "velt archief leden",
            SourceKind::Active => "velt actief leden",
            SourceKind::Mandate => "velt domiciliëringen",
            SourceKind::Gift => "velt giften",
        }
    }

    /// Sources sharing the FileMaker member layout
    pub fn is_filemaker_member(&self) -> bool {
        matches!(
            self,
            SourceKind::Lifetime | SourceKind::Free | SourceKind::Archive
        )
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for SourceKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.table() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SourceKind::ALL.iter().map(SourceKind::table).collect();
                MigrationError::validation(format!(
                    "Unknown source '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// A staged row, identified by its natural key
pub trait StagingRow: Send + Sync {
    fn key(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct AddressMemberRow {
    pub lidmaatschap_id: i64,
    pub street_name: Option<String>,
    pub street_number: Option<String>,
    pub street_number_suffix: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country_iso: Option<String>,
    pub membership_end_date: Option<NaiveDate>,
    pub afdeling_id: Option<i32>,
    pub iban: Option<String>,
    pub bic: Option<String>,
}

impl StagingRow for AddressMemberRow {
    fn key(&self) -> String {
        self.lidmaatschap_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct PersonRow {
    pub id: i64,
    pub lidmaatschap_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

/// Row layout shared by the `leven`, `gratis` and `archief` exports
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct FileMakerMemberRow {
    pub lidnummer: String,
    pub is_organisatie: Option<i8>,
    pub voornaam: Option<String>,
    pub achternaam: Option<String>,
    pub straat: Option<String>,
    pub huisnummer: Option<String>,
    pub bus: Option<String>,
    pub postcode: Option<String>,
    pub gemeente: Option<String>,
    /// Legacy numeric country code
    pub land: Option<i32>,
    pub email: Option<String>,
    pub telefoon: Option<String>,
    pub geslacht: Option<String>,
    pub geboortedatum: Option<String>,
    pub begindatum: Option<String>,
    pub einddatum: Option<String>,
    pub afdeling_id: Option<i32>,
}

impl FileMakerMemberRow {
    pub fn is_organisation(&self) -> bool {
        self.is_organisatie.unwrap_or(0) != 0
    }
}

impl StagingRow for FileMakerMemberRow {
    fn key(&self) -> String {
        self.lidnummer.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct ActiveMemberRow {
    pub lidnummer: String,
    pub begindatum: Option<String>,
    pub einddatum: Option<String>,
}

impl StagingRow for ActiveMemberRow {
    fn key(&self) -> String {
        self.lidnummer.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct MandateRow {
    pub lidnummer: String,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub referentie: Option<String>,
    pub datum_mandaat: Option<String>,
    pub ingangsdatum: Option<String>,
    pub bedrag: Option<f64>,
}

impl StagingRow for MandateRow {
    fn key(&self) -> String {
        self.lidnummer.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct GiftRow {
    pub id: i64,
    pub lidnummer: String,
    pub bedrag: Option<f64>,
    pub datum: Option<String>,
    pub voornaam: Option<String>,
    pub achternaam: Option<String>,
    pub omschrijving: Option<String>,
}

impl StagingRow for GiftRow {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Up to `limit` unclaimed `migratie_adres` rows
    async fn address_members(&self, limit: u32) -> Result<Vec<AddressMemberRow>>;

    /// Up to `limit` unclaimed rows of a FileMaker member table
    async fn filemaker_members(&self, source: SourceKind, limit: u32) -> Result<Vec<FileMakerMemberRow>>;

    async fn active_members(&self, limit: u32) -> Result<Vec<ActiveMemberRow>>;

    async fn mandates(&self, limit: u32) -> Result<Vec<MandateRow>>;

    async fn gifts(&self, limit: u32) -> Result<Vec<GiftRow>>;

    /// Claim one row; a claimed row is never handed out again
    async fn mark_processed(&self, source: SourceKind, key: &str) -> Result<()>;

    async fn persons_for(&self, lidmaatschap_id: i64) -> Result<Vec<PersonRow>>;

    async fn count_persons(&self, lidmaatschap_id: i64) -> Result<i64>;

    /// Write back the household created for an address member, if any
    async fn record_address_member_outcome(
        &self,
        lidmaatschap_id: i64,
        contact_id: Option<i64>,
    ) -> Result<()>;
}

/// Parse the date formats found in the legacy exports
pub fn parse_legacy_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    // DATETIME columns exported as text keep their time part
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y%m%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

/// Trimmed, non-empty text of an optional column
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trips_table_names() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.table().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("personen".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_claim_key_columns() {
        assert_eq!(SourceKind::AddressMember.key_column(), "lidmaatschap_id");
        assert_eq!(SourceKind::AddressMember.processed_column(), "migrated");
        assert_eq!(SourceKind::Gift.key_column(), "id");
        assert_eq!(SourceKind::Mandate.key_column(), "lidnummer");
        assert!(SourceKind::Archive.is_filemaker_member());
        assert!(!SourceKind::Mandate.is_filemaker_member());
    }

    #[test]
    fn test_legacy_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2017, 3, 9);
        assert_eq!(parse_legacy_date(Some("2017-03-09")), expected);
        assert_eq!(parse_legacy_date(Some("09-03-2017")), expected);
        assert_eq!(parse_legacy_date(Some("09/03/2017")), expected);
        assert_eq!(parse_legacy_date(Some("2017-03-09 00:00:00")), expected);
        assert_eq!(parse_legacy_date(Some("  ")), None);
        assert_eq!(parse_legacy_date(Some("gisteren")), None);
        assert_eq!(parse_legacy_date(None), None);
    }
}
