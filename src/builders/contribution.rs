//! Completed contributions and their link to memberships.

use super::to_params;
use crate::context::MigrationContext;
use crate::store::{as_i64, record_id};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionPayload {
    pub contact_id: i64,
    pub financial_type_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instrument_id: Option<i64>,
    pub receive_date: NaiveDate,
    pub total_amount: f64,
    pub contribution_status_id: i64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_recur_id: Option<i64>,
}

pub struct ContributionBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> ContributionBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Completed contribution with the run's status id filled in
    pub fn completed(
        &self,
        contact_id: i64,
        financial_type_id: i64,
        payment_instrument_id: Option<i64>,
        receive_date: NaiveDate,
        total_amount: f64,
        source: &str,
    ) -> ContributionPayload {
        ContributionPayload {
            contact_id,
            financial_type_id,
            payment_instrument_id,
            receive_date,
            total_amount,
            contribution_status_id: self.ctx.refs.completed_contribution_status_id(),
            source: source.to_string(),
            contribution_recur_id: None,
        }
    }

    pub async fn create(&self, payload: &ContributionPayload) -> Option<i64> {
        match self.ctx.store().create("Contribution", to_params(payload)).await {
            Ok(record) => record_id(&record),
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon geen bijdrage van {:.2} toevoegen voor contact {}: {e}",
                    payload.total_amount, payload.contact_id
                ));
                None
            }
        }
    }

    /// Create `payload` and attach it to `membership_id`
    pub async fn create_membership_payment(&self, membership_id: i64, payload: &ContributionPayload) -> bool {
        let Some(contribution_id) = self.create(payload).await else {
            return false;
        };
        match self
            .ctx
            .store()
            .create(
                "MembershipPayment",
                json!({ "membership_id": membership_id, "contribution_id": contribution_id }),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon bijdrage {contribution_id} niet aan lidmaatschap {membership_id} koppelen: {e}"
                ));
                false
            }
        }
    }

    /// Delete every contribution paid for `membership_id`; returns how many
    pub async fn remove_membership_payments(&self, membership_id: i64) -> usize {
        let payments = match self
            .ctx
            .store()
            .get("MembershipPayment", json!({ "membership_id": membership_id }))
            .await
        {
            Ok(payments) => payments,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon betalingen van lidmaatschap {membership_id} niet ophalen: {e}"
                ));
                return 0;
            }
        };

        let mut removed = 0;
        for payment in payments {
            if let Some(contribution_id) = payment.get("contribution_id").and_then(as_i64) {
                if let Err(e) = self.ctx.store().delete("Contribution", contribution_id).await {
                    self.ctx.log.warning(format!(
                        "Kon bijdrage {contribution_id} van lidmaatschap {membership_id} niet verwijderen: {e}"
                    ));
                    continue;
                }
                removed += 1;
            }
            // not every store cascades the link on delete
            if let Some(payment_id) = record_id(&payment) {
                let _ = self.ctx.store().delete("MembershipPayment", payment_id).await;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TestEnvironment, COMPLETED_CONTRIBUTION_STATUS};

    #[tokio::test]
    async fn test_membership_payment_links_completed_contribution() {
        let env = TestEnvironment::new().await.unwrap();
        let builder = ContributionBuilder::new(&env.context);
        let payload = builder.completed(
            10,
            env.seeded.membership_financial_type_id,
            None,
            NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            15.0,
            "Migratie naar CiviCRM 2018",
        );
        assert!(builder.create_membership_payment(77, &payload).await);

        let contributions = env.store.records("Contribution");
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0]["receive_date"], json!("2018-01-01"));
        assert_eq!(
            contributions[0]["contribution_status_id"],
            json!(COMPLETED_CONTRIBUTION_STATUS)
        );
        let links = env.store.find("MembershipPayment", json!({ "membership_id": 77 }));
        assert_eq!(links[0]["contribution_id"], contributions[0]["id"]);
    }

    #[tokio::test]
    async fn test_remove_membership_payments() {
        let env = TestEnvironment::new().await.unwrap();
        let c1 = env.store.insert("Contribution", json!({ "contact_id": 10 }));
        let c2 = env.store.insert("Contribution", json!({ "contact_id": 10 }));
        env.store.insert("MembershipPayment", json!({ "membership_id": 77, "contribution_id": c1 }));
        env.store.insert("MembershipPayment", json!({ "membership_id": 77, "contribution_id": c2 }));
        env.store.insert("MembershipPayment", json!({ "membership_id": 78, "contribution_id": 999 }));

        let removed = ContributionBuilder::new(&env.context)
            .remove_membership_payments(77)
            .await;
        assert_eq!(removed, 2);
        assert_eq!(env.store.count("Contribution"), 0);
        assert_eq!(env.store.count("MembershipPayment"), 1);
    }
}
