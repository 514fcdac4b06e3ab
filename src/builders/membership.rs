//! Membership builder: derived dates and status, one membership per type
//! per contact, and the initial payment of a current membership.

use super::contribution::ContributionBuilder;
use super::{count_existing, to_params, Existing};
use crate::config::MembershipTypeRef;
use crate::context::MigrationContext;
use crate::membership_status::{derive_dates, MembershipDates, MembershipStatus};
use crate::staging::parse_legacy_date;
use crate::store::{as_string, record_id, Record};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipPayload {
    pub contact_id: i64,
    pub membership_type_id: i64,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub join_date: NaiveDate,
    pub status_id: i64,
    pub is_test: u8,
    pub is_pay_later: u8,
    /// Historical member number, keyed `custom_<id>`
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

/// What a recipe knows about the membership it wants
#[derive(Debug, Clone, Copy)]
pub struct MembershipRequest<'r> {
    pub membership_type: &'r MembershipTypeRef,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub historical_number: Option<&'r str>,
}

#[derive(Debug, Clone)]
pub struct PreparedMembership {
    pub payload: MembershipPayload,
    pub dates: MembershipDates,
    pub membership_type: MembershipTypeRef,
}

/// Memberships carrying a given historical member number
#[derive(Debug, Clone, PartialEq)]
pub enum HistoricalMembership {
    Found(Record),
    Missing,
    Ambiguous(usize),
    /// The lookup itself could not run; already logged
    Unavailable,
}

pub struct MembershipBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> MembershipBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    pub fn prepare(&self, contact_id: Option<i64>, request: MembershipRequest<'_>) -> Option<PreparedMembership> {
        let Some(contact_id) = contact_id else {
            self.ctx.log.error("Geen contact id meegegeven voor lidmaatschap");
            return None;
        };

        let dates = derive_dates(
            request.start_date,
            request.end_date,
            self.ctx.config.membership.default_start_date,
            self.ctx.today,
        );

        let mut custom = Map::new();
        if let (Some(field), Some(number)) = (self.ctx.refs.historical_id_field(), request.historical_number) {
            custom.insert(field.to_string(), json!(number));
        }

        Some(PreparedMembership {
            payload: MembershipPayload {
                contact_id,
                membership_type_id: request.membership_type.id,
                start_date: dates.start_date,
                end_date: dates.end_date,
                join_date: dates.join_date,
                status_id: self.ctx.refs.membership_status_id(dates.status),
                is_test: 0,
                is_pay_later: 0,
                custom,
            },
            dates,
            membership_type: request.membership_type.clone(),
        })
    }

    /// Create the membership unless the contact already has one of this type.
    ///
    /// A current membership with a fee also gets its first payment.
    pub async fn create_if_not_exists(&self, prepared: &PreparedMembership) -> Option<i64> {
        let payload = &prepared.payload;
        let type_name = &prepared.membership_type.name;

        let existing = count_existing(
            self.ctx.store(),
            &self.ctx.log,
            "Membership",
            json!({ "contact_id": payload.contact_id, "membership_type_id": payload.membership_type_id }),
        )
        .await?;

        match existing {
            Existing::None => {}
            Existing::One => {
                self.ctx.log.warning(format!(
                    "Er is al een lidmaatschap van het type {type_name} voor {}",
                    payload.contact_id
                ));
                return None;
            }
            Existing::Many(_) => {
                self.ctx.log.error(format!(
                    "Er zijn al meerdere lidmaatschappen van het type {type_name} voor {}, los handmatig op!",
                    payload.contact_id
                ));
                return None;
            }
        }

        let membership_id = match self.ctx.store().create("Membership", to_params(payload)).await {
            Ok(record) => record_id(&record)?,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon geen lidmaatschap {type_name} toevoegen voor {}, melding van API Membership Create : {e}",
                    payload.contact_id
                ));
                return None;
            }
        };

        if prepared.dates.status == MembershipStatus::Current && prepared.membership_type.minimum_fee > 0.0 {
            self.create_payment(membership_id, prepared).await;
        }
        Some(membership_id)
    }

    /// Completed bank-transfer contribution for the membership's fee
    pub async fn create_payment(&self, membership_id: i64, prepared: &PreparedMembership) -> bool {
        let contributions = ContributionBuilder::new(self.ctx);
        let payment = contributions.completed(
            prepared.payload.contact_id,
            prepared.membership_type.financial_type_id,
            self.ctx.refs.bank_transfer_instrument_id(),
            payment_date(prepared.dates.start_date, self.ctx.config.membership.payment_year),
            prepared.membership_type.minimum_fee,
            &self.ctx.config.membership.payment_source,
        );
        contributions.create_membership_payment(membership_id, &payment).await
    }

    pub async fn find_by_historical_number(&self, number: &str) -> HistoricalMembership {
        let Some(field) = self.ctx.refs.historical_id_field() else {
            self.ctx.log.error(format!(
                "Geen eigen veld {} voor historisch lidnummer, kan lid {number} niet opzoeken",
                self.ctx.config.membership.historical_id_field
            ));
            return HistoricalMembership::Unavailable;
        };

        let mut params = Map::new();
        params.insert(field.to_string(), json!(number));
        match self.ctx.store().get("Membership", Value::Object(params)).await {
            Ok(mut records) => match records.len() {
                0 => HistoricalMembership::Missing,
                1 => HistoricalMembership::Found(records.remove(0)),
                n => HistoricalMembership::Ambiguous(n),
            },
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon lidmaatschap met historisch lidnummer {number} niet ophalen: {e}"
                ));
                HistoricalMembership::Unavailable
            }
        }
    }

    /// Move `membership` back to `start_date` when it currently starts later.
    ///
    /// The join date follows when it would otherwise lie after the start.
    pub async fn back_date(&self, membership: &Record, start_date: NaiveDate) -> bool {
        let Some(membership_id) = record_id(membership) else {
            return false;
        };
        let current_start = record_date(membership, "start_date");
        if current_start.is_some_and(|current| current <= start_date) {
            return false;
        }

        let mut params = json!({ "id": membership_id, "start_date": start_date });
        if record_date(membership, "join_date").map_or(true, |join| join > start_date) {
            params["join_date"] = json!(start_date);
        }
        match self.ctx.store().create("Membership", params).await {
            Ok(_) => true,
            Err(e) => {
                self.ctx.log.warning(format!(
                    "Kon startdatum van lidmaatschap {membership_id} niet naar {start_date} verplaatsen: {e}"
                ));
                false
            }
        }
    }

    /// Overwrite the dates and status of an existing membership
    pub async fn update_dates(&self, membership_id: i64, dates: &MembershipDates) -> bool {
        let mut params = json!({
            "id": membership_id,
            "start_date": dates.start_date,
            "join_date": dates.join_date,
            "status_id": self.ctx.refs.membership_status_id(dates.status),
        });
        if let Some(end_date) = dates.end_date {
            params["end_date"] = json!(end_date);
        }
        match self.ctx.store().create("Membership", params).await {
            Ok(_) => true,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon datums van lidmaatschap {membership_id} niet bijwerken: {e}"
                ));
                false
            }
        }
    }
}

/// Month and day of the membership start in the configured payment year.
///
/// A 29 February start falls back to the 28th in a common year.
pub fn payment_date(start_date: NaiveDate, year: i32) -> NaiveDate {
    start_date
        .with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, start_date.month(), 28))
        .unwrap_or(start_date)
}

/// Date field of a record read back from the store
pub(crate) fn record_date(record: &Record, field: &str) -> Option<NaiveDate> {
    let raw = record.get(field).and_then(as_string)?;
    parse_legacy_date(Some(&raw))
}
