//! Address builder: street line assembly, Dutch postcode city lookup,
//! country resolution and shared household addresses.

use super::{flag, to_params};
use crate::context::MigrationContext;
use crate::location_type::{EntityKind, LocationTypeAllocator};
use crate::staging::{non_empty, AddressMemberRow, FileMakerMemberRow};
use crate::store::{as_i64, as_string, record_id, Record, StoreResult};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

/// Address fields as found in a legacy row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSource {
    pub street_name: Option<String>,
    pub street_number: Option<String>,
    pub street_number_suffix: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country_iso: Option<String>,
}

impl From<&AddressMemberRow> for AddressSource {
    fn from(row: &AddressMemberRow) -> Self {
        Self {
            street_name: row.street_name.clone(),
            street_number: row.street_number.clone(),
            street_number_suffix: row.street_number_suffix.clone(),
            postal_code: row.postal_code.clone(),
            city: row.city.clone(),
            country_iso: row.country_iso.clone(),
        }
    }
}

impl From<&FileMakerMemberRow> for AddressSource {
    fn from(row: &FileMakerMemberRow) -> Self {
        Self {
            street_name: row.straat.clone(),
            street_number: row.huisnummer.clone(),
            street_number_suffix: row.bus.clone(),
            postal_code: row.postcode.clone(),
            city: row.gemeente.clone(),
            country_iso: row.land.map(|code| legacy_country_iso(code).to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressPayload {
    pub contact_id: i64,
    pub location_type_id: i64,
    pub is_primary: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_id: Option<i64>,
}

pub struct AddressBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> AddressBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    fn allocator(&self) -> LocationTypeAllocator<'a> {
        LocationTypeAllocator::new(self.ctx.store(), &self.ctx.refs)
    }

    /// Stage an address for `contact_id`; `None` when the contact is missing
    pub async fn prepare(&self, contact_id: Option<i64>, source: &AddressSource) -> Option<AddressPayload> {
        let Some(contact_id) = contact_id else {
            self.ctx.log.error("Geen contact id voor adres");
            return None;
        };

        let allocator = self.allocator();
        let country_id = match non_empty(source.country_iso.as_deref()) {
            Some(iso) => self.country_id(iso).await,
            None => None,
        };

        Some(AddressPayload {
            contact_id,
            location_type_id: allocator
                .determine_for_contact(EntityKind::Address, contact_id)
                .await,
            is_primary: flag(allocator.is_primary(EntityKind::Address, contact_id).await),
            street_address: street_line(
                source.street_name.as_deref(),
                source.street_number.as_deref(),
                source.street_number_suffix.as_deref(),
            ),
            city: self.resolve_city(contact_id, source).await,
            postal_code: non_empty(source.postal_code.as_deref()).map(str::to_string),
            country_id,
            master_id: None,
        })
    }

    pub async fn create(&self, payload: &AddressPayload) -> Option<i64> {
        debug!(contact_id = payload.contact_id, "Creating address");
        match self.ctx.store().create("Address", to_params(payload)).await {
            Ok(record) => record_id(&record),
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kan geen adres toevoegen voor {} met api fout {e}",
                    payload.street_address.as_deref().unwrap_or("(geen straat)")
                ));
                None
            }
        }
    }

    /// Give `contact_id` an address that mirrors master address `master_id`.
    ///
    /// Not idempotent: calling it twice creates two shared addresses.
    pub async fn create_shared(&self, contact_id: Option<i64>, master_id: Option<i64>) -> Option<i64> {
        let (Some(contact_id), Some(master_id)) = (contact_id, master_id) else {
            return None;
        };

        let master = match self.master(master_id).await {
            Ok(master) => master,
            Err(_) => {
                self.ctx
                    .log
                    .warning(format!("Kon geen adres vinden met id {master_id}"));
                return None;
            }
        };

        let allocator = self.allocator();
        let payload = shared_payload(
            &master,
            master_id,
            contact_id,
            allocator
                .determine_for_contact(EntityKind::Address, contact_id)
                .await,
            allocator.is_primary(EntityKind::Address, contact_id).await,
        );

        match self.ctx.store().create("Address", to_params(&payload)).await {
            Ok(record) => record_id(&record),
            Err(e) => {
                self.ctx.log.warning(format!(
                    "Kan geen gedeeld adres toevoegen voor adres {master_id} en contact {contact_id}, \
                     melding van API Address Create : {e}"
                ));
                None
            }
        }
    }

    pub async fn master(&self, master_id: i64) -> StoreResult<Record> {
        self.ctx
            .store()
            .get_single("Address", json!({ "id": master_id }))
            .await
    }

    /// City for the address; Dutch postcodes override the source city
    async fn resolve_city(&self, contact_id: i64, source: &AddressSource) -> Option<String> {
        let source_city = non_empty(source.city.as_deref()).map(str::to_string);
        if non_empty(source.country_iso.as_deref()) != Some("NL") {
            return source_city;
        }

        let Some(postal_code) = non_empty(source.postal_code.as_deref()) else {
            self.ctx.log.warning(format!(
                "Geen postcode voor adres in Nederland, woonplaats uit bron gebruikt bij contact ID {contact_id}"
            ));
            return source_city;
        };

        let Some((digits, letters)) = split_dutch_postcode(postal_code) else {
            self.ctx.log.warning(format!(
                "NL postcode {postal_code} onjuist geformatteerd, woonplaats uit bron gebruikt bij contact ID {contact_id}"
            ));
            return source_city;
        };

        let found = self
            .ctx
            .store()
            .get(
                "PostcodeNL",
                json!({ "postcode_nr": digits, "postcode_letter": letters, "return": "woonplaats" }),
            )
            .await
            .ok()
            .and_then(|records| {
                records
                    .iter()
                    .find_map(|r| r.get("woonplaats").and_then(as_string))
            });

        match found {
            Some(city) => Some(city),
            None => {
                self.ctx.log.warning(format!(
                    "Geen woonplaats gevonden voor postcode {postal_code}, woonplaats uit bron gebruikt bij contact ID {contact_id}"
                ));
                source_city
            }
        }
    }

    /// Store id of the country with `iso`; unknown countries yield `None`
    async fn country_id(&self, iso: &str) -> Option<i64> {
        match self
            .ctx
            .store()
            .get_value("Country", "id", json!({ "iso_code": iso }))
            .await
        {
            Ok(value) => as_i64(&value),
            Err(e) => {
                debug!(iso, error = %e, "Country not found, address created without country");
                None
            }
        }
    }
}

/// Payload mirroring `master` for another contact
pub fn shared_payload(
    master: &Record,
    master_id: i64,
    contact_id: i64,
    location_type_id: i64,
    is_primary: bool,
) -> AddressPayload {
    AddressPayload {
        contact_id,
        location_type_id,
        is_primary: flag(is_primary),
        street_address: master.get("street_address").and_then(as_string),
        city: master.get("city").and_then(as_string),
        postal_code: master.get("postal_code").and_then(as_string),
        country_id: master.get("country_id").and_then(as_i64),
        master_id: Some(master_id),
    }
}

/// Street name, number and suffix joined by single spaces, absent parts omitted
pub fn street_line(name: Option<&str>, number: Option<&str>, suffix: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [name, number, suffix]
        .into_iter()
        .filter_map(non_empty)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// `"1234 AB"` into `("1234", "AB")`; anything but 4 digits + 2 letters fails
pub fn split_dutch_postcode(postal_code: &str) -> Option<(String, String)> {
    let compact: String = postal_code.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.chars().count() != 6 {
        return None;
    }
    let (digits, letters) = compact.split_at(4);
    if !digits.chars().all(|c| c.is_ascii_digit()) || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((digits.to_string(), letters.to_ascii_uppercase()))
}

/// ISO code for the numeric country codes of the FileMaker exports
pub fn legacy_country_iso(code: i32) -> &'static str {
    match code {
        1 => "NL",
        2 => "FR",
        3 => "DE",
        4 => "GB",
        5 => "ES",
        6 => "CH",
        7 => "BI",
        8 => "PT",
        9 => "CA",
        10 => "BF",
        11 => "IT",
        12 => "ZA",
        13 => "IE",
        14 => "LU",
        15 => "DK",
        16 => "GR",
        17 => "SE",
        18 => "US",
        19 => "NO",
        20 => "CR",
        21 => "PH",
        22 => "JO",
        23 => "TR",
        24 => "SK",
        25 => "IS",
        26 => "IL",
        27 => "BR",
        28 => "HU",
        29 => "LT",
        30 => "AU",
        31 => "SL",
        32 => "NZ",
        33 => "FI",
        34 => "AT",
        35 => "SG",
        36 => "IE",
        _ => "BE",
    }
}
