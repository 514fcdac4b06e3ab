//! # Entity Builders
//!
//! Each builder maps flat source fields onto one CRM entity payload and
//! submits it through the [`RecordStore`](crate::store::RecordStore). Store
//! rejections stop at this boundary: they are written to the run log with
//! enough context to fix the record by hand and the builder returns `None`
//! or `false`.
//!
//! Entities that must not be duplicated (relationships, memberships, e-mail,
//! phone, bank references) follow one pre-check rule, see [`Existing`].

pub mod address;
pub mod bank_account;
pub mod contact;
pub mod contribution;
pub mod email;
pub mod mandate;
pub mod membership;
pub mod phone;

pub use address::{AddressBuilder, AddressPayload, AddressSource};
pub use bank_account::BankAccountBuilder;
pub use contact::{contact_kind, ContactBuilder, ContactKind, ContactPayload, PersonDetails};
pub use contribution::{ContributionBuilder, ContributionPayload};
pub use email::EmailBuilder;
pub use mandate::{CreatedMandate, MandateBuilder, MandatePayload, MandateRequest};
pub use membership::{
    HistoricalMembership, MembershipBuilder, MembershipPayload, MembershipRequest,
    PreparedMembership,
};
pub use phone::{PhoneBuilder, PhoneKind};

use crate::run_log::RunLog;
use crate::store::RecordStore;
use serde_json::Value;

/// How many matching records a pre-creation count found.
///
/// `None` means create; `One` means skip with a `Waarschuwing`; `Many` means
/// skip with a `Fout` asking for manual resolution. Duplicates are never
/// merged automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existing {
    None,
    One,
    Many(i64),
}

impl Existing {
    pub fn from_count(count: i64) -> Self {
        match count {
            c if c <= 0 => Existing::None,
            1 => Existing::One,
            c => Existing::Many(c),
        }
    }
}

/// Count `entity` records matching `params`; a failed count is logged and
/// treated as "cannot decide", which callers handle as a skip
pub(crate) async fn count_existing(
    store: &dyn RecordStore,
    log: &RunLog,
    entity: &str,
    params: Value,
) -> Option<Existing> {
    match store.get_count(entity, params).await {
        Ok(count) => Some(Existing::from_count(count)),
        Err(e) => {
            log.error(format!("Kon bestaande {entity} records niet tellen: {e}"));
            None
        }
    }
}

/// Serialize a payload struct into API parameters
pub(crate) fn to_params<T: serde::Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// `1`/`0` as the API expects for flags
pub(crate) fn flag(value: bool) -> u8 {
    u8::from(value)
}
