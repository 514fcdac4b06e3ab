//! E-mail builder with legacy domain rewrite and format validation.

use super::{count_existing, flag, Existing};
use crate::context::MigrationContext;
use crate::location_type::{EntityKind, LocationTypeAllocator};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
        )
        .expect("valid regex")
    })
}

/// Trim and move addresses on the export's placeholder domain to the real one
pub fn normalize_email(raw: &str, legacy_domain: &str, replacement_domain: &str) -> String {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if domain == legacy_domain => {
            format!("{}@{replacement_domain}", local.trim())
        }
        _ => email.to_string(),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    !email.contains("..") && email_pattern().is_match(email)
}

pub struct EmailBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> EmailBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Add `raw` to `contact_id` unless it is invalid or already present
    pub async fn create_if_not_exists(&self, contact_id: i64, raw: &str) -> bool {
        let email = normalize_email(
            raw,
            &self.ctx.config.email.legacy_domain,
            &self.ctx.config.email.replacement_domain,
        );
        if !is_valid_email(&email) {
            self.ctx.log.warning(format!(
                "Email {email} voor contact {contact_id} is geen correct e-mailadres!"
            ));
            return false;
        }

        let existing = count_existing(
            self.ctx.store(),
            &self.ctx.log,
            "Email",
            json!({ "contact_id": contact_id, "email": email }),
        )
        .await;

        match existing {
            Some(Existing::None) => {
                let allocator = LocationTypeAllocator::new(self.ctx.store(), &self.ctx.refs);
                let params = json!({
                    "email": email,
                    "contact_id": contact_id,
                    "is_primary": flag(allocator.is_primary(EntityKind::Email, contact_id).await),
                    "location_type_id": allocator.determine_for_contact(EntityKind::Email, contact_id).await,
                });
                match self.ctx.store().create("Email", params).await {
                    Ok(_) => true,
                    Err(e) => {
                        self.ctx.log.warning(format!(
                            "Kon geen email maken met {email} voor contact {contact_id}: {e}"
                        ));
                        false
                    }
                }
            }
            Some(Existing::One) => {
                self.ctx.log.warning(format!(
                    "Email {email} bestaat al voor contact {contact_id}, niet toegevoegd"
                ));
                false
            }
            Some(Existing::Many(_)) => {
                self.ctx.log.error(format!(
                    "Er bestaan al meerdere emails {email} voor contact {contact_id}, los handmatig op!"
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
    use crate::test_helpers::TestEnvironment;

    #[test]
    fn test_legacy_domain_rewrite() {
        assert_eq!(
            normalize_email(" jan@velt_migratie_2018.be ", "velt_migratie_2018.be", "velt.be"),
            "jan@velt.be"
        );
        assert_eq!(
            normalize_email("jan@telenet.be", "velt_migratie_2018.be", "velt.be"),
            "jan@telenet.be"
        );
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jan@velt.be"));
        assert!(is_valid_email("jan.peeters+velt@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("jan@"));
        assert!(!is_valid_email("jan@velt"));
        assert!(!is_valid_email("jan..p@velt.be"));
        assert!(!is_valid_email("jan@velt_migratie_2018.be"));
    }

    #[tokio::test]
    async fn test_invalid_email_never_reaches_store() {
        let env = TestEnvironment::new().await.unwrap();
        let before = env.store.calls().len();
        assert!(!EmailBuilder::new(&env.context).create_if_not_exists(30, "not-an-email").await);
        assert_eq!(env.store.calls().len(), before);
        assert!(env.log.contains(Severity::Waarschuwing, "geen correct e-mailadres"));
    }

    #[tokio::test]
    async fn test_rewritten_email_is_created_once() {
        let env = TestEnvironment::new().await.unwrap();
        let builder = EmailBuilder::new(&env.context);
        assert!(builder.create_if_not_exists(30, "jan@velt_migratie_2018.be").await);
        assert!(!builder.create_if_not_exists(30, "jan@velt.be").await);

        let emails = env.store.records("Email");
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0]["email"], json!("jan@velt.be"));
        assert_eq!(emails[0]["is_primary"], json!(1));
        assert!(env.log.contains(Severity::Waarschuwing, "bestaat al voor contact 30"));
    }

    #[tokio::test]
    async fn test_two_existing_emails_escalate() {
        let env = TestEnvironment::new().await.unwrap();
        for _ in 0..2 {
            env.store
                .insert("Email", json!({ "contact_id": 30, "email": "jan@velt.be" }));
        }
        assert!(!EmailBuilder::new(&env.context).create_if_not_exists(30, "jan@velt.be").await);
        assert_eq!(env.store.count("Email"), 2);
        assert!(env.log.contains(Severity::Fout, "los handmatig op"));
    }

    #[tokio::test]
    async fn test_second_email_gets_next_slot() {
        let env = TestEnvironment::new().await.unwrap();
        let builder = EmailBuilder::new(&env.context);
        assert!(builder.create_if_not_exists(30, "jan@velt.be").await);
        assert!(builder.create_if_not_exists(30, "jan@werk.be").await);
        let second = env.store.find("Email", json!({ "email": "jan@werk.be" }));
        assert_eq!(second[0]["is_primary"], json!(0));
        assert_eq!(second[0]["location_type_id"], json!(env.seeded.work_location_type_id));
    }
}
