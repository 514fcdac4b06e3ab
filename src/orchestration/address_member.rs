//! Address-based member (`migratie_adres` + `migratie_persoon`): one
//! household per membership, with its persons, address and membership.

use super::SourceMigration;
use crate::builders::{
    AddressBuilder, AddressSource, BankAccountBuilder, ContactBuilder, EmailBuilder,
    MembershipBuilder, MembershipRequest, PersonDetails, PhoneBuilder, PhoneKind,
};
use crate::context::MigrationContext;
use crate::run_log::Severity;
use crate::staging::{non_empty, AddressMemberRow, PersonRow, StagingStore};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Surnames of the first two persons joined with ` & `
pub fn household_name(persons: &[PersonRow]) -> Option<String> {
    let surnames: Vec<&str> = persons
        .iter()
        .take(2)
        .filter_map(|p| non_empty(p.last_name.as_deref()))
        .collect();
    if surnames.is_empty() {
        None
    } else {
        Some(surnames.join(" & "))
    }
}

pub struct AddressMemberMigration<'a> {
    ctx: &'a MigrationContext,
    staging: &'a dyn StagingStore,
}

impl<'a> AddressMemberMigration<'a> {
    pub fn new(ctx: &'a MigrationContext, staging: &'a dyn StagingStore) -> Self {
        Self { ctx, staging }
    }

    /// Run the recipe; returns the household created for the row
    #[instrument(skip(self, row), fields(lidmaatschap_id = row.lidmaatschap_id))]
    pub async fn migrate_household(&self, row: &AddressMemberRow) -> Option<i64> {
        let persons = match self.staging.persons_for(row.lidmaatschap_id).await {
            Ok(persons) => persons,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon personen van lidmaatschap ID {} niet ophalen: {e}",
                    row.lidmaatschap_id
                ));
                return None;
            }
        };

        let Some(name) = household_name(&persons) else {
            self.ctx.log.log(
                Severity::Error,
                format!(
                    "Geen achternamen om een naam huishouden mee samen te stellen voor ID {}",
                    row.lidmaatschap_id
                ),
            );
            return None;
        };

        let contacts = ContactBuilder::new(self.ctx);
        let household_id = contacts
            .create(&contacts.household(&name, row.afdeling_id))
            .await?;
        debug!(household_id, "Household created");

        let addresses = AddressBuilder::new(self.ctx);
        let master_id = match addresses
            .prepare(Some(household_id), &AddressSource::from(row))
            .await
        {
            Some(payload) => addresses.create(&payload).await,
            None => None,
        };

        if let Some(iban) = non_empty(row.iban.as_deref()) {
            BankAccountBuilder::new(self.ctx)
                .create_iban_reference(household_id, iban, row.bic.as_deref())
                .await;
        }

        let mut head_assigned = false;
        for person in &persons {
            let Some(individual_id) = self.migrate_person(person).await else {
                continue;
            };
            let relationship_type_id = if head_assigned {
                self.ctx.refs.member_relationship_type_id()
            } else {
                head_assigned = true;
                self.ctx.refs.head_relationship_type_id()
            };
            contacts
                .create_household_relationship(individual_id, relationship_type_id, household_id)
                .await;
            if master_id.is_some() {
                addresses.create_shared(Some(individual_id), master_id).await;
            }
            self.add_contact_details(individual_id, person).await;
        }

        self.create_membership(household_id, row).await;
        Some(household_id)
    }

    async fn migrate_person(&self, person: &PersonRow) -> Option<i64> {
        let details = PersonDetails {
            first_name: person.first_name.as_deref(),
            last_name: person.last_name.as_deref(),
            gender: person.gender.as_deref(),
            birth_date: person.birth_date.as_deref(),
        };
        if details.is_anonymous() {
            self.ctx.log.error(format!(
                "Persoon met id {} heeft geen voor- en achternaam, niet gemigreerd!",
                person.id
            ));
            return None;
        }
        let contacts = ContactBuilder::new(self.ctx);
        contacts.create(&contacts.individual(details)).await
    }

    async fn add_contact_details(&self, individual_id: i64, person: &PersonRow) {
        if let Some(email) = non_empty(person.email.as_deref()) {
            EmailBuilder::new(self.ctx)
                .create_if_not_exists(individual_id, email)
                .await;
        }
        let phones = PhoneBuilder::new(self.ctx);
        if let Some(phone) = non_empty(person.phone.as_deref()) {
            phones
                .create_if_not_exists(individual_id, PhoneKind::Phone, phone)
                .await;
        }
        if let Some(fax) = non_empty(person.fax.as_deref()) {
            phones
                .create_if_not_exists(individual_id, PhoneKind::Fax, fax)
                .await;
        }
    }

    async fn create_membership(&self, household_id: i64, row: &AddressMemberRow) {
        let Some(membership_type) = self.ctx.refs.address_membership_type() else {
            self.ctx.log.error(format!(
                "Lidmaatschapstype {} onbekend, geen lidmaatschap voor huishouden {household_id}",
                self.ctx.config.membership.address_member_type
            ));
            return;
        };
        let number = row.lidmaatschap_id.to_string();
        let memberships = MembershipBuilder::new(self.ctx);
        if let Some(prepared) = memberships.prepare(
            Some(household_id),
            MembershipRequest {
                membership_type,
                start_date: None,
                end_date: row.membership_end_date,
                historical_number: Some(&number),
            },
        ) {
            memberships.create_if_not_exists(&prepared).await;
        }
    }
}

#[async_trait]
impl SourceMigration for AddressMemberMigration<'_> {
    type Row = AddressMemberRow;

    async fn validate(&self, row: &AddressMemberRow) -> bool {
        match self.staging.count_persons(row.lidmaatschap_id).await {
            Ok(0) => {
                self.ctx.log.error(format!(
                    "Geen personen voor lidmaatschap ID {}",
                    row.lidmaatschap_id
                ));
                false
            }
            Ok(_) => true,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon personen voor lidmaatschap ID {} niet tellen: {e}",
                    row.lidmaatschap_id
                ));
                false
            }
        }
    }

    async fn execute(&self, row: &AddressMemberRow) -> bool {
        self.migrate_household(row).await.is_some()
    }

    /// Migrate and write the resulting household back to the staging row
    async fn migrate(&self, row: &AddressMemberRow) -> bool {
        let household_id = if self.validate(row).await {
            self.migrate_household(row).await
        } else {
            None
        };
        if let Err(e) = self
            .staging
            .record_address_member_outcome(row.lidmaatschap_id, household_id)
            .await
        {
            self.ctx.log.error(format!(
                "Kon resultaat van lidmaatschap ID {} niet terugschrijven: {e}",
                row.lidmaatschap_id
            ));
        }
        household_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(last_name: Option<&str>) -> PersonRow {
        PersonRow {
            last_name: last_name.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_household_name_from_first_two_surnames() {
        let persons = vec![
            person(Some("Peeters")),
            person(Some("Janssens")),
            person(Some("Claes")),
        ];
        assert_eq!(household_name(&persons).as_deref(), Some("Peeters & Janssens"));
    }

    #[test]
    fn test_household_name_skips_blank_surnames() {
        let persons = vec![person(Some(" ")), person(Some("Janssens"))];
        assert_eq!(household_name(&persons).as_deref(), Some("Janssens"));
        assert_eq!(household_name(&[person(None)]), None);
        assert_eq!(household_name(&[]), None);
    }
}
