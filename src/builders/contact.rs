//! Contact builder: households, individuals, organizations and the
//! household relationships between them.

use super::{count_existing, to_params, Existing};
use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::staging::{non_empty, parse_legacy_date};
use crate::store::{as_string, record_id, Record};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContactKind {
    Individual,
    Household,
    Organization,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Individual => "Individual",
            ContactKind::Household => "Household",
            ContactKind::Organization => "Organization",
        }
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Individual" => Ok(ContactKind::Individual),
            "Household" => Ok(ContactKind::Household),
            "Organization" => Ok(ContactKind::Organization),
            other => Err(MigrationError::InvalidContactType(other.to_string())),
        }
    }
}

/// Contact type of a record read back from the store
pub fn contact_kind(record: &Record) -> Result<ContactKind, MigrationError> {
    record
        .get("contact_type")
        .and_then(as_string)
        .unwrap_or_default()
        .parse()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactPayload {
    pub contact_type: ContactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_id: Option<i64>,
    /// `YYYYMMDD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// `custom_<id>` fields
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl ContactPayload {
    fn empty(contact_type: ContactKind) -> Self {
        Self {
            contact_type,
            household_name: None,
            organization_name: None,
            first_name: None,
            last_name: None,
            gender_id: None,
            birth_date: None,
            custom: Map::new(),
        }
    }

    /// Name as it appears in run log messages
    pub fn display_name(&self) -> String {
        match self.contact_type {
            ContactKind::Household => self.household_name.clone().unwrap_or_default(),
            ContactKind::Organization => self.organization_name.clone().unwrap_or_default(),
            ContactKind::Individual => [self.first_name.as_deref(), self.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Person fields shared by the address-member and FileMaker layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonDetails<'r> {
    pub first_name: Option<&'r str>,
    pub last_name: Option<&'r str>,
    pub gender: Option<&'r str>,
    pub birth_date: Option<&'r str>,
}

impl PersonDetails<'_> {
    /// Neither first nor last name: nothing to migrate
    pub fn is_anonymous(&self) -> bool {
        non_empty(self.first_name).is_none() && non_empty(self.last_name).is_none()
    }
}

/// `m` → 2 (male), `v` → 1 (female), anything else → 3
pub fn gender_id(gender: Option<&str>) -> Option<i64> {
    let gender = gender?.trim().to_lowercase();
    Some(match gender.as_str() {
        "m" => 2,
        "v" => 1,
        _ => 3,
    })
}

pub struct ContactBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> ContactBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Household payload, carrying the legacy branch id when the field exists
    pub fn household(&self, name: &str, afdeling_id: Option<i32>) -> ContactPayload {
        let mut payload = ContactPayload::empty(ContactKind::Household);
        payload.household_name = Some(name.to_string());
        if let (Some(field), Some(afdeling_id)) = (self.ctx.refs.household_branch_field(), afdeling_id) {
            payload.custom.insert(field.to_string(), json!(afdeling_id));
        }
        payload
    }

    /// Individual payload; unparseable birth dates are dropped
    pub fn individual(&self, person: PersonDetails<'_>) -> ContactPayload {
        let mut payload = ContactPayload::empty(ContactKind::Individual);
        payload.first_name = non_empty(person.first_name).map(str::to_string);
        payload.last_name = non_empty(person.last_name).map(str::to_string);
        payload.gender_id = gender_id(person.gender);
        payload.birth_date = parse_legacy_date(person.birth_date).map(|d| d.format("%Y%m%d").to_string());
        payload
    }

    /// Organization named after the non-empty name parts
    pub fn organization(&self, first: Option<&str>, last: Option<&str>) -> ContactPayload {
        let mut payload = ContactPayload::empty(ContactKind::Organization);
        let name: Vec<&str> = [first, last].into_iter().filter_map(non_empty).collect();
        payload.organization_name = Some(name.join(" "));
        payload
    }

    pub async fn create(&self, payload: &ContactPayload) -> Option<i64> {
        match self.ctx.store().create("Contact", to_params(payload)).await {
            Ok(record) => record_id(&record),
            Err(e) => {
                let what = match payload.contact_type {
                    ContactKind::Household => "huishouden",
                    ContactKind::Individual => "persoon",
                    ContactKind::Organization => "organisatie",
                };
                self.ctx.log.error(format!(
                    "Kan geen {what} toevoegen met naam {}, api fout {e}",
                    payload.display_name()
                ));
                None
            }
        }
    }

    /// Relate `individual_id` to `household_id` unless that exact
    /// relationship already exists; returns whether one was created
    pub async fn create_household_relationship(
        &self,
        individual_id: i64,
        relationship_type_id: i64,
        household_id: i64,
    ) -> bool {
        let existing = count_existing(
            self.ctx.store(),
            &self.ctx.log,
            "Relationship",
            json!({
                "relationship_type_id": relationship_type_id,
                "contact_id_a": individual_id,
                "contact_id_b": household_id,
            }),
        )
        .await;

        match existing {
            Some(Existing::None) => {
                let created = self
                    .ctx
                    .store()
                    .create(
                        "Relationship",
                        json!({
                            "relationship_type_id": relationship_type_id,
                            "is_active": 1,
                            "contact_id_a": individual_id,
                            "contact_id_b": household_id,
                        }),
                    )
                    .await;
                match created {
                    Ok(_) => true,
                    Err(e) => {
                        self.ctx.log.warning(format!(
                            "Kon geen relatie tussen huishouden {household_id} en persoon {individual_id} toevoegen, \
                             melding van API Relationship Create : {e}"
                        ));
                        false
                    }
                }
            }
            Some(Existing::One) => {
                self.ctx.log.warning(format!(
                    "Er is al een huishouden relatie tussen persoon {individual_id} en huishouden {household_id}, \
                     geen nieuwe toegevoegd."
                ));
                false
            }
            Some(Existing::Many(_)) => {
                self.ctx.log.error(format!(
                    "Er zijn al meerdere huishouden relaties tussen persoon {individual_id} en huishouden {household_id}, \
                     zoek dit handmatig uit!"
                ));
                false
            }
            None => false,
        }
    }
}
