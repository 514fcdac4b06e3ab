//! # Location-Type Allocator
//!
//! Picks the location-type slot (home, work, other, ...) for a new address,
//! e-mail or phone so that one contact's records of the same kind do not
//! collide. The first record of a kind gets the default slot; later ones take
//! the first unused non-default slot; once those are exhausted the default
//! slot is reused. The allocator never fails.

use crate::config::{LocationTypeRef, ReferenceIds};
use crate::store::{as_i64, RecordStore};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Address,
    Email,
    Phone,
}

impl EntityKind {
    /// Store entity holding records of this kind
    pub fn entity(&self) -> &'static str {
        match self {
            EntityKind::Address => "Address",
            EntityKind::Email => "Email",
            EntityKind::Phone => "Phone",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity())
    }
}

pub struct LocationTypeAllocator<'a> {
    store: &'a dyn RecordStore,
    location_types: &'a [LocationTypeRef],
}

impl<'a> LocationTypeAllocator<'a> {
    pub fn new(store: &'a dyn RecordStore, refs: &'a ReferenceIds) -> Self {
        Self {
            store,
            location_types: refs.location_types(),
        }
    }

    pub fn default_location_type(&self) -> i64 {
        default_of(self.location_types)
    }

    /// Location type for the next `kind` record of `contact_id`
    pub async fn determine_for_contact(&self, kind: EntityKind, contact_id: i64) -> i64 {
        let existing = self
            .store
            .get(
                kind.entity(),
                json!({ "contact_id": contact_id, "return": "location_type_id" }),
            )
            .await;

        match existing {
            Ok(records) => {
                let used: Vec<i64> = records
                    .iter()
                    .filter_map(|r| r.get("location_type_id").and_then(as_i64))
                    .collect();
                pick_location_type(self.location_types, &used, !records.is_empty())
            }
            Err(e) => {
                warn!(entity = %kind, contact_id, error = %e, "Could not list existing location types, using default");
                self.default_location_type()
            }
        }
    }

    /// Whether a new `kind` record would be the contact's first primary one
    pub async fn is_primary(&self, kind: EntityKind, contact_id: i64) -> bool {
        match self
            .store
            .get_count(
                kind.entity(),
                json!({ "contact_id": contact_id, "is_primary": 1 }),
            )
            .await
        {
            Ok(count) => count == 0,
            Err(e) => {
                warn!(entity = %kind, contact_id, error = %e, "Could not count primary records");
                false
            }
        }
    }
}

/// Slot choice given the location types already in use.
///
/// `has_records` distinguishes "no records yet" from "records without a
/// location type", both of which leave `used` empty.
pub fn pick_location_type(
    location_types: &[LocationTypeRef],
    used: &[i64],
    has_records: bool,
) -> i64 {
    let default_id = default_of(location_types);
    if !has_records {
        return default_id;
    }
    let used: HashSet<i64> = used.iter().copied().collect();
    location_types
        .iter()
        .find(|lt| !lt.is_default && !used.contains(&lt.id))
        .map(|lt| lt.id)
        .unwrap_or(default_id)
}

fn default_of(location_types: &[LocationTypeRef]) -> i64 {
    location_types
        .iter()
        .find(|lt| lt.is_default)
        .or_else(|| location_types.first())
        .map(|lt| lt.id)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Vec<LocationTypeRef> {
        vec![
            LocationTypeRef { id: 1, name: "Home".into(), is_default: true },
            LocationTypeRef { id: 2, name: "Work".into(), is_default: false },
            LocationTypeRef { id: 3, name: "Other".into(), is_default: false },
        ]
    }

    #[test]
    fn test_first_record_gets_default() {
        assert_eq!(pick_location_type(&types(), &[], false), 1);
    }

    #[test]
    fn test_later_records_diversify_in_enumeration_order() {
        assert_eq!(pick_location_type(&types(), &[1], true), 2);
        assert_eq!(pick_location_type(&types(), &[1, 2], true), 3);
        assert_eq!(pick_location_type(&types(), &[2], true), 3);
    }

    #[test]
    fn test_exhausted_types_fall_back_to_default() {
        assert_eq!(pick_location_type(&types(), &[1, 2, 3], true), 1);
        assert_eq!(pick_location_type(&types(), &[2, 3], true), 1);
    }

    #[test]
    fn test_records_without_location_type_still_skip_default() {
        assert_eq!(pick_location_type(&types(), &[], true), 2);
    }
}
