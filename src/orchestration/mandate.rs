//! Mandate recipe (`mandaat`): a SEPA mandate for an existing membership,
//! which then gets its payments rebuilt from the mandate.

use super::SourceMigration;
use crate::builders::{
    ContributionBuilder, HistoricalMembership, MandateBuilder, MandateRequest, MembershipBuilder,
};
use crate::context::MigrationContext;
use crate::staging::{non_empty, parse_legacy_date, MandateRow};
use crate::store::{as_i64, record_id};
use async_trait::async_trait;
use tracing::debug;

pub struct MandateMigration<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> MandateMigration<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SourceMigration for MandateMigration<'_> {
    type Row = MandateRow;

    async fn validate(&self, row: &MandateRow) -> bool {
        if non_empty(row.iban.as_deref()).is_none() {
            self.ctx.log.error(format!(
                "Mandaat voor lid {} heeft geen IBAN, niet gemigreerd!",
                row.lidnummer
            ));
            return false;
        }
        true
    }

    async fn execute(&self, row: &MandateRow) -> bool {
        let memberships = MembershipBuilder::new(self.ctx);
        let membership = match memberships.find_by_historical_number(&row.lidnummer).await {
            HistoricalMembership::Found(membership) => membership,
            HistoricalMembership::Missing => {
                self.ctx.log.error(format!(
                    "Geen lidmaatschap gevonden voor mandaat van lid {}",
                    row.lidnummer
                ));
                return false;
            }
            HistoricalMembership::Ambiguous(count) => {
                self.ctx.log.error(format!(
                    "Er zijn {count} lidmaatschappen voor mandaat van lid {}, los handmatig op!",
                    row.lidnummer
                ));
                return false;
            }
            HistoricalMembership::Unavailable => return false,
        };
        let (Some(membership_id), Some(contact_id)) = (
            record_id(&membership),
            membership.get("contact_id").and_then(as_i64),
        ) else {
            self.ctx.log.error(format!(
                "Lidmaatschap voor mandaat van lid {} mist id of contact",
                row.lidnummer
            ));
            return false;
        };

        let signed_on = parse_legacy_date(row.datum_mandaat.as_deref());
        let start_date = parse_legacy_date(row.ingangsdatum.as_deref())
            .or(signed_on)
            .unwrap_or(self.ctx.today);
        let source = &self.ctx.config.membership.payment_source;

        let mandates = MandateBuilder::new(self.ctx);
        let payload = mandates.prepare(
            &MandateRequest {
                contact_id,
                iban: row.iban.as_deref().unwrap_or_default(),
                bic: row.bic.as_deref(),
                reference: row.referentie.as_deref(),
                signed_on: signed_on.unwrap_or(start_date),
                start_date,
                amount: row.bedrag,
            },
            source,
        );
        let Some(created) = mandates.create(&payload).await else {
            return false;
        };
        debug!(mandate_id = created.mandate_id, membership_id, "Mandate created");

        memberships.back_date(&membership, start_date).await;

        let contributions = ContributionBuilder::new(self.ctx);
        let removed = contributions.remove_membership_payments(membership_id).await;
        debug!(removed, membership_id, "Replaced membership payments");

        let mut payment = contributions.completed(
            contact_id,
            payload.financial_type_id,
            Some(self.ctx.refs.sepa_rcur_instrument_id()),
            start_date,
            payload.amount,
            source,
        );
        payment.contribution_recur_id = created.contribution_recur_id;
        contributions
            .create_membership_payment(membership_id, &payment)
            .await
    }
}
