//! SEPA mandate builder. A mandate is created with `createfull`, which also
//! creates the recurring contribution it collects against.

use super::to_params;
use crate::context::MigrationContext;
use crate::store::{as_i64, record_id};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MandatePayload {
    pub creditor_id: i64,
    pub financial_type_id: i64,
    pub contact_id: i64,
    pub iban: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Signature date
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_date: Option<NaiveDate>,
    pub start_date: NaiveDate,
    pub frequency_unit: String,
    pub frequency_interval: u32,
    pub cycle_day: u32,
    #[serde(rename = "type")]
    pub mandate_type: &'static str,
    pub status: &'static str,
    pub amount: f64,
    pub source: String,
}

/// A created mandate and its recurring contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedMandate {
    pub mandate_id: i64,
    pub contribution_recur_id: Option<i64>,
}

/// Fields a mandate row supplies
#[derive(Debug, Clone)]
pub struct MandateRequest<'r> {
    pub contact_id: i64,
    pub iban: &'r str,
    pub bic: Option<&'r str>,
    pub reference: Option<&'r str>,
    pub signed_on: NaiveDate,
    pub start_date: NaiveDate,
    pub amount: Option<f64>,
}

pub struct MandateBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> MandateBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Recurring monthly mandate; a missing or zero amount falls back to
    /// the default membership fee
    pub fn prepare(&self, request: &MandateRequest<'_>, source: &str) -> MandatePayload {
        let refs = &self.ctx.refs;
        let sepa = &self.ctx.config.sepa;
        let amount = request
            .amount
            .filter(|amount| *amount > 0.0)
            .unwrap_or_else(|| refs.default_membership_fee());

        MandatePayload {
            creditor_id: sepa.creditor_id,
            financial_type_id: refs.membership_financial_type_id(),
            contact_id: request.contact_id,
            iban: normalize_iban(request.iban),
            bic: request.bic.map(str::trim).filter(|b| !b.is_empty()).map(str::to_uppercase),
            reference: request.reference.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            date: request.signed_on,
            validation_date: Some(request.signed_on),
            start_date: request.start_date,
            frequency_unit: refs.monthly_frequency_unit().to_string(),
            frequency_interval: sepa.frequency_interval,
            cycle_day: sepa.cycle_day,
            mandate_type: refs.recur_type(),
            status: refs.recur_status(),
            amount,
            source: source.to_string(),
        }
    }

    pub async fn create(&self, payload: &MandatePayload) -> Option<CreatedMandate> {
        match self
            .ctx
            .store()
            .create_with("SepaMandate", "createfull", to_params(payload))
            .await
        {
            Ok(record) => Some(CreatedMandate {
                mandate_id: record_id(&record)?,
                contribution_recur_id: record.get("entity_id").and_then(as_i64),
            }),
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon geen mandaat met IBAN {} toevoegen voor contact {}: {e}",
                    payload.iban, payload.contact_id
                ));
                None
            }
        }
    }
}

/// Uppercase without spaces, as the banking extension stores it
pub fn normalize_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}
