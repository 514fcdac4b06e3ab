//! Gift recipe (`giften`): one completed contribution per gift, booked on
//! the donor found by historical member number. Unknown donors become new
//! individuals in a review group.

use super::SourceMigration;
use crate::builders::{
    ContactBuilder, ContributionBuilder, HistoricalMembership, MembershipBuilder, PersonDetails,
};
use crate::context::MigrationContext;
use crate::error::{MigrationError, Result};
use crate::staging::{parse_legacy_date, GiftRow};
use crate::store::{as_i64, record_id, StoreError};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub struct GiftMigration<'a> {
    ctx: &'a MigrationContext,
    review_group_id: i64,
}

impl<'a> GiftMigration<'a> {
    /// Recipe with the review group in place; a missing group that cannot be
    /// created aborts the batch
    pub async fn prepare(ctx: &'a MigrationContext) -> Result<Self> {
        let review_group_id = ensure_review_group(ctx).await?;
        Ok(Self {
            ctx,
            review_group_id,
        })
    }

    pub fn review_group_id(&self) -> i64 {
        self.review_group_id
    }

    async fn donor(&self, row: &GiftRow) -> Option<i64> {
        match MembershipBuilder::new(self.ctx)
            .find_by_historical_number(&row.lidnummer)
            .await
        {
            HistoricalMembership::Found(membership) => membership.get("contact_id").and_then(as_i64),
            HistoricalMembership::Missing => self.create_donor(row).await,
            HistoricalMembership::Ambiguous(count) => {
                self.ctx.log.error(format!(
                    "Er zijn {count} lidmaatschappen met historisch lidnummer {} voor gift, los handmatig op!",
                    row.lidnummer
                ));
                None
            }
            HistoricalMembership::Unavailable => None,
        }
    }

    /// New individual for an unknown donor, parked in the review group
    async fn create_donor(&self, row: &GiftRow) -> Option<i64> {
        let details = PersonDetails {
            first_name: row.voornaam.as_deref(),
            last_name: row.achternaam.as_deref(),
            ..Default::default()
        };
        if details.is_anonymous() {
            self.ctx.log.error(format!(
                "Gever met lidnummer {} niet gevonden en heeft geen naam, gift niet gemigreerd!",
                row.lidnummer
            ));
            return None;
        }

        let contacts = ContactBuilder::new(self.ctx);
        let contact_id = contacts.create(&contacts.individual(details)).await?;
        match self
            .ctx
            .store()
            .create(
                "GroupContact",
                json!({ "group_id": self.review_group_id, "contact_id": contact_id }),
            )
            .await
        {
            Ok(_) => self.ctx.log.warning(format!(
                "Gever met lidnummer {} niet gevonden, nieuw contact {contact_id} toegevoegd aan groep {}",
                row.lidnummer, self.ctx.config.gifts.review_group_title
            )),
            Err(e) => self.ctx.log.warning(format!(
                "Kon nieuw contact {contact_id} niet aan groep {} toevoegen: {e}",
                self.ctx.config.gifts.review_group_title
            )),
        }
        Some(contact_id)
    }
}

/// Id of the review group, creating it when it does not exist yet
pub async fn ensure_review_group(ctx: &MigrationContext) -> Result<i64> {
    let title = &ctx.config.gifts.review_group_title;
    let review_group_failed = |e: StoreError| {
        MigrationError::configuration(format!(
            "Kon geen groep {title} vinden of toevoegen! Melding van API Group: {e}"
        ))
    };

    let count = ctx
        .store()
        .get_count("Group", json!({ "title": title }))
        .await
        .map_err(review_group_failed)?;
    if count == 0 {
        let created = ctx
            .store()
            .create("Group", json!({ "title": title, "is_active": 1 }))
            .await
            .map_err(review_group_failed)?;
        info!(title = %title, "Created gift review group");
        return record_id(&created)
            .ok_or_else(|| MigrationError::configuration(format!("Group {title} created without id")));
    }

    let id = ctx
        .store()
        .get_value("Group", "id", json!({ "title": title }))
        .await
        .map_err(review_group_failed)?;
    as_i64(&id).ok_or_else(|| MigrationError::configuration(format!("Group {title} has no numeric id")))
}

#[async_trait]
impl SourceMigration for GiftMigration<'_> {
    type Row = GiftRow;

    async fn validate(&self, row: &GiftRow) -> bool {
        if !row.bedrag.is_some_and(|amount| amount > 0.0) {
            self.ctx.log.error(format!(
                "Gift van lid {} heeft geen bedrag, niet gemigreerd!",
                row.lidnummer
            ));
            return false;
        }
        true
    }

    async fn execute(&self, row: &GiftRow) -> bool {
        let Some(contact_id) = self.donor(row).await else {
            return false;
        };
        let contributions = ContributionBuilder::new(self.ctx);
        let gift = contributions.completed(
            contact_id,
            self.ctx.refs.gift_financial_type_id(),
            self.ctx.refs.bank_transfer_instrument_id(),
            parse_legacy_date(row.datum.as_deref()).unwrap_or(self.ctx.today),
            row.bedrag.unwrap_or_default(),
            &self.ctx.config.gifts.source,
        );
        contributions.create(&gift).await.is_some()
    }
}
