//! # Reference Identifiers
//!
//! Fixed identifiers that live inside the CRM (option values, status ids,
//! relationship types, financial types, location types, custom fields).
//! They are resolved once at the start of a run and then handed to every
//! component as a read-only value. A missing mandatory lookup is a
//! configuration error and aborts the run before any row is touched.

use super::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::membership_status::MembershipStatus;
use crate::store::{as_i64, is_truthy, RecordStore, StoreError};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

pub const RECUR_STATUS: &str = "RCUR";
pub const RECUR_TYPE: &str = "RCUR";

const HEAD_OF_HOUSEHOLD: &str = "Head of Household for";
const HOUSEHOLD_MEMBER: &str = "Household Member of";
const PRIMARY_MEMBERSHIP_FINANCIAL_TYPE: &str = "Contributie";
const FALLBACK_MEMBERSHIP_FINANCIAL_TYPE: &str = "Member Dues";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipTypeRef {
    pub id: i64,
    pub name: String,
    pub financial_type_id: i64,
    pub minimum_fee: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationTypeRef {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceIds {
    sepa_rcur_instrument_id: i64,
    bank_transfer_instrument_id: Option<i64>,
    completed_contribution_status_id: i64,
    monthly_frequency_unit: String,
    membership_statuses: HashMap<String, i64>,
    membership_financial_type_id: i64,
    gift_financial_type_id: i64,
    default_membership_fee: f64,
    membership_types: HashMap<String, MembershipTypeRef>,
    address_member_type: String,
    head_relationship_type_id: i64,
    member_relationship_type_id: i64,
    location_types: Vec<LocationTypeRef>,
    phone_type_id: Option<i64>,
    fax_type_id: Option<i64>,
    historical_id_field: Option<String>,
    household_branch_field: Option<String>,
    iban_reference_type_id: Option<i64>,
}

impl ReferenceIds {
    /// Resolve every reference value through the store
    pub async fn resolve(store: &dyn RecordStore, config: &MigrationConfig) -> Result<Self> {
        let sepa_rcur_instrument_id =
            required_option_value(store, "payment_instrument", "RCUR").await?;
        let completed_contribution_status_id =
            required_option_value(store, "contribution_status", "Completed").await?;
        let monthly_frequency_unit =
            required_option_string(store, "recur_frequency_units", "month").await?;

        let bank_transfer_instrument_id =
            optional_option_value(store, "payment_instrument", "Bank Transfer").await?;
        let phone_type_id = optional_option_value(store, "phone_type", "Phone").await?;
        let fax_type_id = optional_option_value(store, "phone_type", "Fax").await?;
        let iban_reference_type_id =
            optional_option_value(store, "civicrm_banking.reference_types", "IBAN").await?;

        let membership_financial_type_id = match optional(
            store
                .get_value("FinancialType", "id", json!({ "name": PRIMARY_MEMBERSHIP_FINANCIAL_TYPE }))
                .await,
        )? {
            Some(value) => numeric("FinancialType", &value)?,
            None => {
                let value = store
                    .get_value("FinancialType", "id", json!({ "name": FALLBACK_MEMBERSHIP_FINANCIAL_TYPE }))
                    .await
                    .map_err(|e| {
                        MigrationError::configuration(format!(
                            "Kon geen financieel type {PRIMARY_MEMBERSHIP_FINANCIAL_TYPE} of {FALLBACK_MEMBERSHIP_FINANCIAL_TYPE} vinden: {e}"
                        ))
                    })?;
                numeric("FinancialType", &value)?
            }
        };

        let gift_financial_type_id = {
            let value = store
                .get_value("FinancialType", "id", json!({ "name": config.gifts.financial_type }))
                .await
                .map_err(|e| {
                    MigrationError::configuration(format!(
                        "Kon geen financieel type {} voor giften vinden: {e}",
                        config.gifts.financial_type
                    ))
                })?;
            numeric("FinancialType", &value)?
        };

        let membership_types = resolve_membership_types(store, config).await?;
        let default_membership_fee = membership_types
            .get(&config.membership.address_member_type)
            .map(|t| t.minimum_fee)
            .ok_or_else(|| {
                MigrationError::configuration(format!(
                    "Kon geen bedrag vinden voor lidmaatschapstype {}",
                    config.membership.address_member_type
                ))
            })?;

        let membership_statuses = resolve_membership_statuses(store).await?;
        let (head_relationship_type_id, member_relationship_type_id) =
            resolve_relationship_types(store).await?;
        let location_types = resolve_location_types(store).await?;

        let historical_id_field =
            optional_custom_field(store, &config.membership.historical_id_field).await?;
        let household_branch_field =
            optional_custom_field(store, &config.membership.household_branch_field).await?;

        info!(
            membership_types = membership_types.len(),
            location_types = location_types.len(),
            historical_id_field = ?historical_id_field,
            "Reference identifiers resolved"
        );

        Ok(Self {
            sepa_rcur_instrument_id,
            bank_transfer_instrument_id,
            completed_contribution_status_id,
            monthly_frequency_unit,
            membership_statuses,
            membership_financial_type_id,
            gift_financial_type_id,
            default_membership_fee,
            membership_types,
            address_member_type: config.membership.address_member_type.clone(),
            head_relationship_type_id,
            member_relationship_type_id,
            location_types,
            phone_type_id,
            fax_type_id,
            historical_id_field,
            household_branch_field,
            iban_reference_type_id,
        })
    }

    pub fn recur_status(&self) -> &'static str {
        RECUR_STATUS
    }

    pub fn recur_type(&self) -> &'static str {
        RECUR_TYPE
    }

    pub fn sepa_rcur_instrument_id(&self) -> i64 {
        self.sepa_rcur_instrument_id
    }

    pub fn bank_transfer_instrument_id(&self) -> Option<i64> {
        self.bank_transfer_instrument_id
    }

    pub fn completed_contribution_status_id(&self) -> i64 {
        self.completed_contribution_status_id
    }

    pub fn monthly_frequency_unit(&self) -> &str {
        &self.monthly_frequency_unit
    }

    pub fn membership_status_id(&self, status: MembershipStatus) -> i64 {
        // presence of every lifecycle status is checked in resolve()
        self.membership_statuses
            .get(status.name())
            .copied()
            .unwrap_or_default()
    }

    pub fn membership_financial_type_id(&self) -> i64 {
        self.membership_financial_type_id
    }

    pub fn gift_financial_type_id(&self) -> i64 {
        self.gift_financial_type_id
    }

    /// Minimum fee of the address membership type
    pub fn default_membership_fee(&self) -> f64 {
        self.default_membership_fee
    }

    pub fn membership_type(&self, name: &str) -> Option<&MembershipTypeRef> {
        self.membership_types.get(name)
    }

    pub fn address_membership_type(&self) -> Option<&MembershipTypeRef> {
        self.membership_types.get(&self.address_member_type)
    }

    pub fn head_relationship_type_id(&self) -> i64 {
        self.head_relationship_type_id
    }

    pub fn member_relationship_type_id(&self) -> i64 {
        self.member_relationship_type_id
    }

    /// Location types in the order the store enumerates them
    pub fn location_types(&self) -> &[LocationTypeRef] {
        &self.location_types
    }

    pub fn phone_type_id(&self) -> Option<i64> {
        self.phone_type_id
    }

    pub fn fax_type_id(&self) -> Option<i64> {
        self.fax_type_id
    }

    /// `custom_<id>` key of the membership's legacy member number field
    pub fn historical_id_field(&self) -> Option<&str> {
        self.historical_id_field.as_deref()
    }

    pub fn household_branch_field(&self) -> Option<&str> {
        self.household_branch_field.as_deref()
    }

    pub fn iban_reference_type_id(&self) -> Option<i64> {
        self.iban_reference_type_id
    }
}

/// Rejections mean "not there"; anything else is a real failure
fn optional<T>(result: std::result::Result<T, StoreError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::Rejected { .. }) | Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(MigrationError::configuration(format!(
            "Reference lookup failed: {e}"
        ))),
    }
}

fn numeric(entity: &str, value: &Value) -> Result<i64> {
    as_i64(value).ok_or_else(|| {
        MigrationError::configuration(format!("{entity} returned non-numeric id {value}"))
    })
}

async fn option_value(store: &dyn RecordStore, group: &str, name: &str) -> std::result::Result<Value, StoreError> {
    store
        .get_value(
            "OptionValue",
            "value",
            json!({ "option_group_id": group, "name": name }),
        )
        .await
}

pub(crate) async fn required_option_value(store: &dyn RecordStore, group: &str, name: &str) -> Result<i64> {
    let value = option_value(store, group, name).await.map_err(|e| {
        MigrationError::configuration(format!(
            "Kon geen option value in groep {group} vinden met naam {name}: {e}"
        ))
    })?;
    numeric("OptionValue", &value)
}

async fn required_option_string(store: &dyn RecordStore, group: &str, name: &str) -> Result<String> {
    let value = option_value(store, group, name).await.map_err(|e| {
        MigrationError::configuration(format!(
            "Kon geen option value in groep {group} vinden met naam {name}: {e}"
        ))
    })?;
    crate::store::as_string(&value).ok_or_else(|| {
        MigrationError::configuration(format!("Option value {group}.{name} is empty"))
    })
}

async fn optional_option_value(store: &dyn RecordStore, group: &str, name: &str) -> Result<Option<i64>> {
    let value = optional(option_value(store, group, name).await)?;
    if value.is_none() {
        debug!(group, name, "Optional option value not present");
    }
    Ok(value.as_ref().and_then(as_i64))
}

pub(crate) async fn optional_custom_field(store: &dyn RecordStore, name: &str) -> Result<Option<String>> {
    if name.trim().is_empty() {
        return Ok(None);
    }
    let value = optional(store.get_value("CustomField", "id", json!({ "name": name })).await)?;
    Ok(value.as_ref().and_then(as_i64).map(|id| format!("custom_{id}")))
}

async fn resolve_membership_types(
    store: &dyn RecordStore,
    config: &MigrationConfig,
) -> Result<HashMap<String, MembershipTypeRef>> {
    let names = config.membership_type_names();
    let records = store
        .get("MembershipType", json!({ "name": { "IN": names } }))
        .await
        .map_err(|e| MigrationError::configuration(format!("Kon lidmaatschapstypes niet ophalen: {e}")))?;

    let mut types = HashMap::new();
    for record in records {
        let Some(name) = record.get("name").and_then(Value::as_str) else {
            continue;
        };
        let id = record.get("id").and_then(as_i64);
        let financial_type_id = record.get("financial_type_id").and_then(as_i64);
        let minimum_fee = record
            .get("minimum_fee")
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(0.0);
        if let (Some(id), Some(financial_type_id)) = (id, financial_type_id) {
            types.insert(
                name.to_string(),
                MembershipTypeRef {
                    id,
                    name: name.to_string(),
                    financial_type_id,
                    minimum_fee,
                },
            );
        }
    }

    for name in names {
        if !types.contains_key(name) {
            return Err(MigrationError::configuration(format!(
                "Kon geen lidmaatschapstype met naam {name} vinden"
            )));
        }
    }
    Ok(types)
}

async fn resolve_membership_statuses(store: &dyn RecordStore) -> Result<HashMap<String, i64>> {
    let records = store
        .get("MembershipStatus", json!({}))
        .await
        .map_err(|e| MigrationError::configuration(format!("Kon geen lidmaatschapsstatussen vinden: {e}")))?;

    let statuses: HashMap<String, i64> = records
        .iter()
        .filter_map(|record| {
            let name = record.get("name")?.as_str()?.to_string();
            let id = as_i64(record.get("id")?)?;
            Some((name, id))
        })
        .collect();

    for status in MembershipStatus::ALL {
        if !statuses.contains_key(status.name()) {
            return Err(MigrationError::configuration(format!(
                "Kon geen lidmaatschapsstatus {} vinden",
                status.name()
            )));
        }
    }
    Ok(statuses)
}

async fn resolve_relationship_types(store: &dyn RecordStore) -> Result<(i64, i64)> {
    let records = store
        .get(
            "RelationshipType",
            json!({ "name_a_b": { "IN": [HEAD_OF_HOUSEHOLD, HOUSEHOLD_MEMBER] } }),
        )
        .await
        .map_err(|e| {
            MigrationError::configuration(format!(
                "Could not find relationship types {HEAD_OF_HOUSEHOLD} / {HOUSEHOLD_MEMBER}: {e}"
            ))
        })?;

    let find = |name: &str| {
        records
            .iter()
            .find(|r| r.get("name_a_b").and_then(Value::as_str) == Some(name))
            .and_then(|r| r.get("id").and_then(as_i64))
    };

    match (find(HEAD_OF_HOUSEHOLD), find(HOUSEHOLD_MEMBER)) {
        (Some(head), Some(member)) => Ok((head, member)),
        _ => Err(MigrationError::configuration(format!(
            "Could not find relationship types {HEAD_OF_HOUSEHOLD} and {HOUSEHOLD_MEMBER}"
        ))),
    }
}

async fn resolve_location_types(store: &dyn RecordStore) -> Result<Vec<LocationTypeRef>> {
    let records = store
        .get("LocationType", json!({}))
        .await
        .map_err(|e| MigrationError::configuration(format!("Kon geen locatietypes vinden: {e}")))?;

    let location_types: Vec<LocationTypeRef> = records
        .iter()
        .filter_map(|record| {
            Some(LocationTypeRef {
                id: as_i64(record.get("id")?)?,
                name: record
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_default: is_truthy(record.get("is_default")),
            })
        })
        .collect();

    if !location_types.iter().any(|lt| lt.is_default) {
        return Err(MigrationError::configuration(
            "Geen standaard locatietype gevonden",
        ));
    }
    Ok(location_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{seed_reference_data, test_config, InMemoryStore};

    #[tokio::test]
    async fn test_resolves_seeded_reference_data() {
        let store = InMemoryStore::new();
        let seeded = seed_reference_data(&store);
        let refs = ReferenceIds::resolve(&store, &test_config()).await.unwrap();

        assert_eq!(refs.completed_contribution_status_id(), 1);
        assert_eq!(refs.monthly_frequency_unit(), "month");
        assert_eq!(refs.head_relationship_type_id(), seeded.head_relationship_type_id);
        assert_eq!(refs.default_membership_fee(), 15.0);
        assert_eq!(
            refs.membership_status_id(MembershipStatus::Grace),
            seeded.grace_status_id
        );
        assert_eq!(
            refs.historical_id_field(),
            Some(format!("custom_{}", seeded.historical_id_field_id).as_str())
        );
        assert_eq!(refs.location_types().len(), 3);
        assert_eq!(
            refs.membership_financial_type_id(),
            seeded.membership_financial_type_id
        );
    }

    #[tokio::test]
    async fn test_missing_completed_status_is_fatal() {
        let store = InMemoryStore::new();
        seed_reference_data(&store);
        store.remove_where("OptionValue", "name", "Completed");

        let err = ReferenceIds::resolve(&store, &test_config()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("contribution_status"));
    }

    #[tokio::test]
    async fn test_financial_type_falls_back_to_member_dues() {
        let store = InMemoryStore::new();
        seed_reference_data(&store);
        store.remove_where("FinancialType", "name", "Contributie");
        let dues = store.insert("FinancialType", json!({ "name": "Member Dues" }));

        let refs = ReferenceIds::resolve(&store, &test_config()).await.unwrap();
        assert_eq!(refs.membership_financial_type_id(), dues);
    }

    #[tokio::test]
    async fn test_missing_membership_type_is_fatal() {
        let store = InMemoryStore::new();
        seed_reference_data(&store);
        store.remove_where("MembershipType", "name", "Gratis lid");

        let err = ReferenceIds::resolve(&store, &test_config()).await.unwrap_err();
        assert!(err.to_string().contains("Gratis lid"));
    }

    #[tokio::test]
    async fn test_optional_lookups_may_be_absent() {
        let store = InMemoryStore::new();
        seed_reference_data(&store);
        store.remove_where("OptionValue", "name", "Fax");
        store.remove_where("CustomField", "name", "velt_oud_hh_afd_id");

        let refs = ReferenceIds::resolve(&store, &test_config()).await.unwrap();
        assert_eq!(refs.fax_type_id(), None);
        assert_eq!(refs.household_branch_field(), None);
        assert!(refs.phone_type_id().is_some());
    }
}
