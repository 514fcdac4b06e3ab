//! Active member date fix (`actief`): corrects the dates and status of a
//! membership that was already migrated under its historical number.

use super::SourceMigration;
use crate::builders::membership::record_date;
use crate::builders::{HistoricalMembership, MembershipBuilder};
use crate::context::MigrationContext;
use crate::membership_status::derive_dates;
use crate::staging::{parse_legacy_date, ActiveMemberRow};
use crate::store::record_id;
use async_trait::async_trait;

pub struct ActiveMemberMigration<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> ActiveMemberMigration<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SourceMigration for ActiveMemberMigration<'_> {
    type Row = ActiveMemberRow;

    async fn validate(&self, row: &ActiveMemberRow) -> bool {
        if parse_legacy_date(row.begindatum.as_deref()).is_none()
            && parse_legacy_date(row.einddatum.as_deref()).is_none()
        {
            self.ctx.log.error(format!(
                "Actief lid {} heeft geen begin- of einddatum, niets bijgewerkt",
                row.lidnummer
            ));
            return false;
        }
        true
    }

    async fn execute(&self, row: &ActiveMemberRow) -> bool {
        let memberships = MembershipBuilder::new(self.ctx);
        let membership = match memberships.find_by_historical_number(&row.lidnummer).await {
            HistoricalMembership::Found(membership) => membership,
            HistoricalMembership::Missing => {
                self.ctx.log.error(format!(
                    "Geen lidmaatschap gevonden met historisch lidnummer {}",
                    row.lidnummer
                ));
                return false;
            }
            HistoricalMembership::Ambiguous(count) => {
                self.ctx.log.error(format!(
                    "Er zijn {count} lidmaatschappen met historisch lidnummer {}, los handmatig op!",
                    row.lidnummer
                ));
                return false;
            }
            HistoricalMembership::Unavailable => return false,
        };
        let Some(membership_id) = record_id(&membership) else {
            return false;
        };

        // without a new end date the status follows the stored one
        let end_date = parse_legacy_date(row.einddatum.as_deref())
            .or_else(|| record_date(&membership, "end_date"));
        let dates = derive_dates(
            parse_legacy_date(row.begindatum.as_deref()),
            end_date,
            self.ctx.config.membership.default_start_date,
            self.ctx.today,
        );
        memberships.update_dates(membership_id, &dates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::Severity;
    use crate::test_helpers::TestEnvironment;
    use serde_json::json;

    fn row(lidnummer: &str, einddatum: Option<&str>) -> ActiveMemberRow {
        ActiveMemberRow {
            lidnummer: lidnummer.to_string(),
            begindatum: None,
            einddatum: einddatum.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_dates_and_status_are_corrected() {
        let env = TestEnvironment::new().await.unwrap();
        let field = format!("custom_{}", env.seeded.historical_id_field_id);
        let id = env.store.insert(
            "Membership",
            json!({ "contact_id": 10, field.as_str(): "501", "status_id": env.seeded.current_status_id }),
        );

        let recipe = ActiveMemberMigration::new(&env.context);
        assert!(recipe.migrate(&row("501", Some("2017-12-31"))).await);

        let updated = env.store.find("Membership", json!({ "id": id }));
        assert_eq!(updated[0]["end_date"], json!("2017-12-31"));
        assert_eq!(updated[0]["start_date"], json!("2016-12-31"));
        assert_eq!(updated[0]["status_id"], json!(env.seeded.expired_status_id));
    }

    #[tokio::test]
    async fn test_start_only_row_keeps_status_of_stored_end_date() {
        let env = TestEnvironment::new().await.unwrap();
        let field = format!("custom_{}", env.seeded.historical_id_field_id);
        let id = env.store.insert(
            "Membership",
            json!({ "contact_id": 10, field.as_str(): "502", "start_date": "2016-01-01",
                    "end_date": "2016-12-31", "status_id": env.seeded.expired_status_id }),
        );

        let recipe = ActiveMemberMigration::new(&env.context);
        let row = ActiveMemberRow {
            lidnummer: "502".to_string(),
            begindatum: Some("2015-01-01".to_string()),
            einddatum: None,
        };
        assert!(recipe.migrate(&row).await);

        let updated = env.store.find("Membership", json!({ "id": id }));
        assert_eq!(updated[0]["start_date"], json!("2015-01-01"));
        assert_eq!(updated[0]["end_date"], json!("2016-12-31"));
        assert_eq!(updated[0]["status_id"], json!(env.seeded.expired_status_id));
    }

    #[tokio::test]
    async fn test_start_only_row_without_stored_end_date_is_current() {
        let env = TestEnvironment::new().await.unwrap();
        let field = format!("custom_{}", env.seeded.historical_id_field_id);
        let id = env.store.insert(
            "Membership",
            json!({ "contact_id": 10, field.as_str(): "503", "status_id": env.seeded.grace_status_id }),
        );

        let recipe = ActiveMemberMigration::new(&env.context);
        let row = ActiveMemberRow {
            lidnummer: "503".to_string(),
            begindatum: Some("2018-02-01".to_string()),
            einddatum: None,
        };
        assert!(recipe.migrate(&row).await);

        let updated = env.store.find("Membership", json!({ "id": id }));
        assert_eq!(updated[0]["status_id"], json!(env.seeded.current_status_id));
        assert!(updated[0].get("end_date").is_none());
    }

    #[tokio::test]
    async fn test_unknown_member_number_is_an_error() {
        let env = TestEnvironment::new().await.unwrap();
        let recipe = ActiveMemberMigration::new(&env.context);
        assert!(!recipe.migrate(&row("999", Some("2019-12-31"))).await);
        assert!(env.log.contains(Severity::Fout, "Geen lidmaatschap gevonden met historisch lidnummer 999"));
    }

    #[tokio::test]
    async fn test_row_without_dates_is_rejected() {
        let env = TestEnvironment::new().await.unwrap();
        let recipe = ActiveMemberMigration::new(&env.context);
        assert!(!recipe.migrate(&row("501", None)).await);
        assert_eq!(env.store.calls_to("Membership", "get"), 0);
    }
}
