//! Phone and fax builder.

use super::{count_existing, flag, Existing};
use crate::context::MigrationContext;
use crate::location_type::{EntityKind, LocationTypeAllocator};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneKind {
    Phone,
    Fax,
}

pub struct PhoneBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> PhoneBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    fn phone_type_id(&self, kind: PhoneKind) -> Option<i64> {
        match kind {
            PhoneKind::Phone => self.ctx.refs.phone_type_id(),
            PhoneKind::Fax => self.ctx.refs.fax_type_id(),
        }
    }

    /// Add `raw` to `contact_id` unless it is empty or already present
    pub async fn create_if_not_exists(&self, contact_id: i64, kind: PhoneKind, raw: &str) -> bool {
        let phone = raw.trim();
        if phone.is_empty() {
            self.ctx.log.warning(format!(
                "Telefoon mag niet leeg zijn voor contact {contact_id}"
            ));
            return false;
        }

        let existing = count_existing(
            self.ctx.store(),
            &self.ctx.log,
            "Phone",
            json!({ "contact_id": contact_id, "phone": phone }),
        )
        .await;

        match existing {
            Some(Existing::None) => {
                let allocator = LocationTypeAllocator::new(self.ctx.store(), &self.ctx.refs);
                let mut params = json!({
                    "phone": phone,
                    "contact_id": contact_id,
                    "is_primary": flag(allocator.is_primary(EntityKind::Phone, contact_id).await),
                    "location_type_id": allocator.determine_for_contact(EntityKind::Phone, contact_id).await,
                });
                if let Some(phone_type_id) = self.phone_type_id(kind) {
                    params["phone_type_id"] = json!(phone_type_id);
                }
                match self.ctx.store().create("Phone", params).await {
                    Ok(_) => true,
                    Err(e) => {
                        self.ctx.log.warning(format!(
                            "Kon geen telefoon maken met {phone} voor contact {contact_id}: {e}"
                        ));
                        false
                    }
                }
            }
            Some(Existing::One) => {
                self.ctx.log.warning(format!(
                    "Telefoon {phone} bestaat al voor contact {contact_id}, niet toegevoegd"
                ));
                false
            }
            Some(Existing::Many(_)) => {
                self.ctx.log.error(format!(
                    "Er bestaan al meerdere telefoons {phone} voor contact {contact_id}, los handmatig op!"
                ));
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::Severity;
    use crate::test_helpers::{TestEnvironment, FAX_TYPE, PHONE_TYPE};

    #[tokio::test]
    async fn test_phone_and_fax_types() {
        let env = TestEnvironment::new().await.unwrap();
        let builder = PhoneBuilder::new(&env.context);
        assert!(builder.create_if_not_exists(30, PhoneKind::Phone, "09 123 45 67").await);
        assert!(builder.create_if_not_exists(30, PhoneKind::Fax, "09 123 45 68").await);

        let phone = env.store.find("Phone", json!({ "phone": "09 123 45 67" }));
        assert_eq!(phone[0]["phone_type_id"], json!(PHONE_TYPE));
        assert_eq!(phone[0]["is_primary"], json!(1));
        let fax = env.store.find("Phone", json!({ "phone": "09 123 45 68" }));
        assert_eq!(fax[0]["phone_type_id"], json!(FAX_TYPE));
        assert_eq!(fax[0]["is_primary"], json!(0));
    }

    #[tokio::test]
    async fn test_phone_bookkeeping_ignores_emails() {
        let env = TestEnvironment::new().await.unwrap();
        env.store.insert(
            "Email",
            json!({ "contact_id": 30, "email": "jan@velt.be", "is_primary": 1,
                    "location_type_id": env.seeded.home_location_type_id }),
        );
        assert!(PhoneBuilder::new(&env.context)
            .create_if_not_exists(30, PhoneKind::Phone, "0475 11 22 33")
            .await);
        let phone = env.store.records("Phone");
        assert_eq!(phone[0]["is_primary"], json!(1));
        assert_eq!(phone[0]["location_type_id"], json!(env.seeded.home_location_type_id));
    }

    #[tokio::test]
    async fn test_empty_phone_is_rejected() {
        let env = TestEnvironment::new().await.unwrap();
        assert!(!PhoneBuilder::new(&env.context)
            .create_if_not_exists(30, PhoneKind::Phone, "  ")
            .await);
        assert_eq!(env.store.count("Phone"), 0);
        assert!(env.log.contains(Severity::Waarschuwing, "mag niet leeg zijn"));
    }

    #[tokio::test]
    async fn test_existing_phone_is_skipped() {
        let env = TestEnvironment::new().await.unwrap();
        env.store.insert("Phone", json!({ "contact_id": 30, "phone": "0475 11 22 33" }));
        assert!(!PhoneBuilder::new(&env.context)
            .create_if_not_exists(30, PhoneKind::Phone, "0475 11 22 33")
            .await);
        assert!(env.log.contains(Severity::Waarschuwing, "bestaat al"));
    }
}
