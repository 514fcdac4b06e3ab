//! Bank account with an IBAN reference, for the CiviBanking extension.

use super::mandate::normalize_iban;
use super::{count_existing, Existing};
use crate::context::MigrationContext;
use crate::store::record_id;
use serde_json::json;

pub struct BankAccountBuilder<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> BankAccountBuilder<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Attach `iban` to `contact_id` unless some account already carries it
    pub async fn create_iban_reference(&self, contact_id: i64, iban: &str, bic: Option<&str>) -> bool {
        let Some(reference_type_id) = self.ctx.refs.iban_reference_type_id() else {
            self.ctx.log.warning(format!(
                "Geen IBAN referentietype gevonden, bankrekening niet toegevoegd voor contact {contact_id}"
            ));
            return false;
        };
        let iban = normalize_iban(iban);
        if iban.is_empty() {
            return false;
        }

        let existing = count_existing(
            self.ctx.store(),
            &self.ctx.log,
            "BankingAccountReference",
            json!({ "reference": iban, "reference_type_id": reference_type_id }),
        )
        .await;
        match existing {
            Some(Existing::None) => {}
            Some(Existing::One) => {
                self.ctx.log.warning(format!(
                    "Bankrekening {iban} bestaat al, niet toegevoegd voor contact {contact_id}"
                ));
                return false;
            }
            Some(Existing::Many(_)) => {
                self.ctx.log.error(format!(
                    "Er bestaan al meerdere bankrekeningen {iban}, los handmatig op voor contact {contact_id}!"
                ));
                return false;
            }
            None => return false,
        }

        let data_parsed = match bic.map(str::trim).filter(|b| !b.is_empty()) {
            Some(bic) => json!({ "BIC": bic.to_uppercase() }),
            None => json!({}),
        };
        let account = self
            .ctx
            .store()
            .create(
                "BankingAccount",
                json!({
                    "contact_id": contact_id,
                    "description": format!("Rekening {iban}"),
                    "data_parsed": data_parsed.to_string(),
                }),
            )
            .await;
        let account_id = match account {
            Ok(record) => record_id(&record),
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon geen bankrekening {iban} toevoegen voor contact {contact_id}: {e}"
                ));
                return false;
            }
        };
        let Some(account_id) = account_id else {
            return false;
        };

        match self
            .ctx
            .store()
            .create(
                "BankingAccountReference",
                json!({ "ba_id": account_id, "reference": iban, "reference_type_id": reference_type_id }),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                self.ctx.log.error(format!(
                    "Kon geen IBAN referentie {iban} toevoegen aan bankrekening {account_id}: {e}"
                ));
                false
            }
        }
    }
}
