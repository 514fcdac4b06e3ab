//! FileMaker member exports (`leven`, `gratis`, `archief`). Each row is one
//! member: an organization, or a household with a single head.

use super::SourceMigration;
use crate::builders::{
    AddressBuilder, AddressSource, ContactBuilder, EmailBuilder, MembershipBuilder,
    MembershipRequest, PersonDetails, PhoneBuilder, PhoneKind,
};
use crate::config::MembershipTypeRef;
use crate::context::MigrationContext;
use crate::error::{MigrationError, Result};
use crate::staging::{non_empty, parse_legacy_date, FileMakerMemberRow, SourceKind};
use async_trait::async_trait;
use tracing::debug;

pub struct FileMakerMigration<'a> {
    ctx: &'a MigrationContext,
    source: SourceKind,
    membership_type: &'a MembershipTypeRef,
}

impl<'a> FileMakerMigration<'a> {
    /// Recipe for one of the FileMaker tables; the membership type configured
    /// for that table must have been resolved
    pub fn new(ctx: &'a MigrationContext, source: SourceKind) -> Result<Self> {
        let membership = &ctx.config.membership;
        let type_name = match source {
            SourceKind::Lifetime => &membership.lifetime_member_type,
            SourceKind::Free => &membership.free_member_type,
            SourceKind::Archive => &membership.archive_member_type,
            other => {
                return Err(MigrationError::validation(format!(
                    "{other} is not a FileMaker member table"
                )))
            }
        };
        let membership_type = ctx.refs.membership_type(type_name).ok_or_else(|| {
            MigrationError::configuration(format!("Membership type '{type_name}' not resolved"))
        })?;
        Ok(Self {
            ctx,
            source,
            membership_type,
        })
    }

    /// Lifetime memberships never end
    fn end_date(&self, row: &FileMakerMemberRow) -> Option<chrono::NaiveDate> {
        match self.source {
            SourceKind::Lifetime => None,
            _ => parse_legacy_date(row.einddatum.as_deref()),
        }
    }

    /// Organization member; returns the organization id
    async fn migrate_organisation(&self, row: &FileMakerMemberRow) -> Option<i64> {
        let contacts = ContactBuilder::new(self.ctx);
        let organisation_id = contacts
            .create(&contacts.organization(row.voornaam.as_deref(), row.achternaam.as_deref()))
            .await?;

        let addresses = AddressBuilder::new(self.ctx);
        if let Some(payload) = addresses
            .prepare(Some(organisation_id), &AddressSource::from(row))
            .await
        {
            addresses.create(&payload).await;
        }
        self.add_contact_details(organisation_id, row).await;
        Some(organisation_id)
    }

    /// Household with the member as its head; returns the household id
    async fn migrate_household(&self, row: &FileMakerMemberRow) -> Option<i64> {
        let contacts = ContactBuilder::new(self.ctx);
        let surname = non_empty(row.achternaam.as_deref())?;
        let household_id = contacts
            .create(&contacts.household(surname, row.afdeling_id))
            .await?;

        let addresses = AddressBuilder::new(self.ctx);
        let master_id = match addresses
            .prepare(Some(household_id), &AddressSource::from(row))
            .await
        {
            Some(payload) => addresses.create(&payload).await,
            None => None,
        };

        let individual = contacts.individual(PersonDetails {
            first_name: row.voornaam.as_deref(),
            last_name: row.achternaam.as_deref(),
            gender: row.geslacht.as_deref(),
            birth_date: row.geboortedatum.as_deref(),
        });
        if let Some(individual_id) = contacts.create(&individual).await {
            contacts
                .create_household_relationship(
                    individual_id,
                    self.ctx.refs.head_relationship_type_id(),
                    household_id,
                )
                .await;
            if master_id.is_some() {
                addresses.create_shared(Some(individual_id), master_id).await;
            }
            self.add_contact_details(individual_id, row).await;
        }
        Some(household_id)
    }

    async fn add_contact_details(&self, contact_id: i64, row: &FileMakerMemberRow) {
        if let Some(email) = non_empty(row.email.as_deref()) {
            EmailBuilder::new(self.ctx)
                .create_if_not_exists(contact_id, email)
                .await;
        }
        if let Some(phone) = non_empty(row.telefoon.as_deref()) {
            PhoneBuilder::new(self.ctx)
                .create_if_not_exists(contact_id, PhoneKind::Phone, phone)
                .await;
        }
    }

    async fn create_membership(&self, contact_id: i64, row: &FileMakerMemberRow) {
        let memberships = MembershipBuilder::new(self.ctx);
        if let Some(prepared) = memberships.prepare(
            Some(contact_id),
            MembershipRequest {
                membership_type: self.membership_type,
                start_date: parse_legacy_date(row.begindatum.as_deref()),
                end_date: self.end_date(row),
                historical_number: Some(&row.lidnummer),
            },
        ) {
            memberships.create_if_not_exists(&prepared).await;
        }
    }
}

#[async_trait]
impl SourceMigration for FileMakerMigration<'_> {
    type Row = FileMakerMemberRow;

    async fn validate(&self, row: &FileMakerMemberRow) -> bool {
        let has_name = if row.is_organisation() {
            non_empty(row.voornaam.as_deref()).is_some() || non_empty(row.achternaam.as_deref()).is_some()
        } else {
            non_empty(row.achternaam.as_deref()).is_some()
        };
        if !has_name {
            self.ctx.log.error(format!(
                "Lid {} uit {} heeft geen (organisatie)naam, niet gemigreerd!",
                row.lidnummer, self.source
            ));
            return false;
        }

        if self.source == SourceKind::Archive && parse_legacy_date(row.einddatum.as_deref()).is_none() {
            self.ctx.log.error(format!(
                "Archief lid {} heeft geen geldige einddatum, niet gemigreerd!",
                row.lidnummer
            ));
            return false;
        }
        true
    }

    async fn execute(&self, row: &FileMakerMemberRow) -> bool {
        debug!(source = %self.source, lidnummer = %row.lidnummer, "Migrating FileMaker member");
        let contact_id = if row.is_organisation() {
            self.migrate_organisation(row).await
        } else {
            self.migrate_household(row).await
        };
        let Some(contact_id) = contact_id else {
            return false;
        };
        self.create_membership(contact_id, row).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::Severity;
    use crate::test_helpers::TestEnvironment;

    #[tokio::test]
    async fn test_only_filemaker_tables_have_a_recipe() {
        let env = TestEnvironment::new().await.unwrap();
        assert!(FileMakerMigration::new(&env.context, SourceKind::Lifetime).is_ok());
        assert!(FileMakerMigration::new(&env.context, SourceKind::Gift).is_err());
    }

    #[tokio::test]
    async fn test_archive_requires_end_date() {
        let env = TestEnvironment::new().await.unwrap();
        let recipe = FileMakerMigration::new(&env.context, SourceKind::Archive).unwrap();
        let row = FileMakerMemberRow {
            lidnummer: "A-12".to_string(),
            achternaam: Some("Peeters".to_string()),
            einddatum: Some("ooit".to_string()),
            ..Default::default()
        };
        assert!(!recipe.validate(&row).await);
        assert!(env.log.contains(Severity::Fout, "Archief lid A-12 heeft geen geldige einddatum"));
    }

    #[tokio::test]
    async fn test_organisation_may_lack_surname() {
        let env = TestEnvironment::new().await.unwrap();
        let recipe = FileMakerMigration::new(&env.context, SourceKind::Free).unwrap();
        let row = FileMakerMemberRow {
            lidnummer: "G-3".to_string(),
            is_organisatie: Some(1),
            voornaam: Some("Kringwinkel".to_string()),
            ..Default::default()
        };
        assert!(recipe.validate(&row).await);

        let person = FileMakerMemberRow {
            is_organisatie: Some(0),
            ..row
        };
        assert!(!recipe.validate(&person).await);
    }
}
