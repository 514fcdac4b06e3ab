//! Repairs run after the batches: duplicate household relationships,
//! household members whose address drifted from the household's, surplus
//! heads of household, membership defaults and clearing memberships for a
//! fresh run.

use crate::builders::{contact_kind, AddressBuilder, ContactKind};
use crate::config::reference::{optional_custom_field, required_option_value};
use crate::config::MAX_BATCH_SIZE;
use crate::context::MigrationContext;
use crate::error::{MigrationError, Result};
use crate::store::{as_i64, is_truthy, record_id, RecordStore};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Delete "member" relationships that repeat a "head" relationship for the
/// same individual and household; returns how many were deleted
pub async fn fix_household_relationships(ctx: &MigrationContext) -> Result<usize> {
    let refs = &ctx.refs;
    let heads = ctx
        .store()
        .get(
            "Relationship",
            json!({ "relationship_type_id": refs.head_relationship_type_id() }),
        )
        .await?;

    let mut removed = 0;
    for head in heads {
        let (Some(individual_id), Some(household_id)) = (
            head.get("contact_id_a").and_then(as_i64),
            head.get("contact_id_b").and_then(as_i64),
        ) else {
            continue;
        };
        let duplicates = ctx
            .store()
            .get(
                "Relationship",
                json!({
                    "relationship_type_id": refs.member_relationship_type_id(),
                    "contact_id_a": individual_id,
                    "contact_id_b": household_id,
                }),
            )
            .await?;
        for duplicate in duplicates.iter().filter_map(record_id) {
            ctx.store().delete("Relationship", duplicate).await?;
            removed += 1;
        }
    }
    info!(removed, "Removed member relationships duplicating a head relationship");
    Ok(removed)
}

/// Replace every household member's addresses with one shared copy of the
/// household's primary address; returns how many addresses were rebuilt
pub async fn fix_shared_addresses(ctx: &MigrationContext) -> Result<usize> {
    let refs = &ctx.refs;
    let households = ctx
        .store()
        .get("Contact", json!({ "contact_type": ContactKind::Household.as_str() }))
        .await?;
    let addresses = AddressBuilder::new(ctx);

    let mut rebuilt = 0;
    for household_id in households.iter().filter_map(record_id) {
        let primary = ctx
            .store()
            .get("Address", json!({ "contact_id": household_id, "is_primary": 1 }))
            .await?;
        let Some(master_id) = primary.first().and_then(record_id) else {
            continue;
        };

        let relationships = ctx
            .store()
            .get(
                "Relationship",
                json!({
                    "contact_id_b": household_id,
                    "relationship_type_id": {
                        "IN": [refs.head_relationship_type_id(), refs.member_relationship_type_id()]
                    },
                }),
            )
            .await?;
        let members: HashSet<i64> = relationships
            .iter()
            .filter_map(|r| r.get("contact_id_a").and_then(as_i64))
            .collect();

        for member_id in members {
            let own = ctx
                .store()
                .get("Address", json!({ "contact_id": member_id }))
                .await?;
            for address_id in own.iter().filter_map(record_id) {
                ctx.store().delete("Address", address_id).await?;
            }
            match addresses.create_shared(Some(member_id), Some(master_id)).await {
                Some(_) => rebuilt += 1,
                None => warn!(member_id, master_id, "Shared address not rebuilt"),
            }
        }
    }
    info!(rebuilt, "Rebuilt shared household addresses");
    Ok(rebuilt)
}

/// Delete individuals that head a household but hold no membership of
/// their own; returns how many were deleted.
///
/// A contact that cannot be deleted is logged and skipped.
pub async fn remove_surplus_heads(ctx: &MigrationContext) -> Result<usize> {
    let heads = ctx
        .store()
        .get(
            "Relationship",
            json!({ "relationship_type_id": ctx.refs.head_relationship_type_id() }),
        )
        .await?;
    let candidates: BTreeSet<i64> = heads
        .iter()
        .filter_map(|r| r.get("contact_id_a").and_then(as_i64))
        .collect();

    let mut removed = 0;
    for contact_id in candidates {
        let Some(contact) = ctx
            .store()
            .get("Contact", json!({ "id": contact_id }))
            .await?
            .into_iter()
            .next()
        else {
            continue;
        };
        if contact_kind(&contact)? != ContactKind::Individual || is_truthy(contact.get("is_deleted")) {
            continue;
        }
        let memberships = ctx
            .store()
            .get_count("Membership", json!({ "contact_id": contact_id }))
            .await?;
        if memberships > 0 {
            continue;
        }

        match ctx.store().delete("Contact", contact_id).await {
            Ok(()) => {
                info!(contact_id, "Removed head of household without membership");
                removed += 1;
            }
            Err(e) => ctx
                .log
                .warning(format!("Kon contact met ID {contact_id} niet verwijderen: {e}")),
        }
    }
    info!(removed, "Removed surplus heads of household");
    Ok(removed)
}

/// Set "seasons by post" and the default origin on every membership;
/// returns how many memberships were updated
pub async fn correct_membership_defaults(ctx: &MigrationContext) -> Result<usize> {
    let settings = &ctx.config.maintenance;
    let store = ctx.store();
    let origin = required_option_value(store, &settings.origin_option_group, &settings.default_origin)
        .await
        .map_err(|e| {
            MigrationError::configuration(format!(
                "Kon geen option value voor herkomst {} vinden: {e}",
                settings.default_origin
            ))
        })?;
    let seasons_field = required_custom_field(store, &settings.seasons_post_field).await?;
    let origin_field = required_custom_field(store, &settings.origin_field).await?;

    let memberships = store.get("Membership", json!({ "return": "id" })).await?;
    let mut corrected = 0;
    for membership_id in memberships.iter().filter_map(record_id) {
        let mut params = Map::new();
        params.insert("id".to_string(), json!(membership_id));
        params.insert(seasons_field.clone(), json!(1));
        params.insert(origin_field.clone(), json!(origin));
        store.create("Membership", Value::Object(params)).await?;
        corrected += 1;
    }
    info!(corrected, origin, "Corrected membership defaults");
    Ok(corrected)
}

/// Delete up to `limit` memberships (default from configuration, at most
/// [`MAX_BATCH_SIZE`]); returns how many were deleted
pub async fn clear_memberships(ctx: &MigrationContext, limit: Option<u32>) -> Result<usize> {
    let limit = limit
        .unwrap_or(ctx.config.maintenance.clear_batch_size)
        .clamp(1, MAX_BATCH_SIZE);
    let memberships = ctx
        .store()
        .get("Membership", json!({ "return": "id", "options": { "limit": limit } }))
        .await?;

    let mut cleared = 0;
    for membership_id in memberships.iter().filter_map(record_id) {
        ctx.store().delete("Membership", membership_id).await?;
        cleared += 1;
    }
    warn!(cleared, limit, "Cleared memberships");
    Ok(cleared)
}

async fn required_custom_field(store: &dyn RecordStore, name: &str) -> Result<String> {
    optional_custom_field(store, name)
        .await?
        .ok_or_else(|| MigrationError::configuration(format!("Kon geen eigen veld {name} vinden")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::Severity;
    use crate::test_helpers::TestEnvironment;

    #[tokio::test]
    async fn test_member_duplicating_head_is_removed() {
        let env = TestEnvironment::new().await.unwrap();
        let head = env.seeded.head_relationship_type_id;
        let member = env.seeded.member_relationship_type_id;
        env.store.insert("Relationship", json!({ "relationship_type_id": head, "contact_id_a": 20, "contact_id_b": 10 }));
        env.store.insert("Relationship", json!({ "relationship_type_id": member, "contact_id_a": 20, "contact_id_b": 10 }));
        env.store.insert("Relationship", json!({ "relationship_type_id": member, "contact_id_a": 21, "contact_id_b": 10 }));

        assert_eq!(fix_household_relationships(&env.context).await.unwrap(), 1);
        let left = env.store.find("Relationship", json!({ "relationship_type_id": member }));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["contact_id_a"], json!(21));
    }

    #[tokio::test]
    async fn test_member_addresses_become_shared() {
        let env = TestEnvironment::new().await.unwrap();
        let household = env.store.insert("Contact", json!({ "contact_type": "Household" }));
        let master = env.store.insert(
            "Address",
            json!({ "contact_id": household, "is_primary": 1, "street_address": "Kerkstraat 12 B",
                    "city": "Gent", "postal_code": "9000", "location_type_id": env.seeded.home_location_type_id }),
        );
        env.store.insert(
            "Relationship",
            json!({ "relationship_type_id": env.seeded.member_relationship_type_id,
                    "contact_id_a": 30, "contact_id_b": household }),
        );
        env.store.insert("Address", json!({ "contact_id": 30, "street_address": "Oude straat 1", "is_primary": 1 }));

        assert_eq!(fix_shared_addresses(&env.context).await.unwrap(), 1);
        let member_addresses = env.store.find("Address", json!({ "contact_id": 30 }));
        assert_eq!(member_addresses.len(), 1);
        assert_eq!(member_addresses[0]["master_id"], json!(master));
        assert_eq!(member_addresses[0]["street_address"], json!("Kerkstraat 12 B"));
        assert_eq!(member_addresses[0]["is_primary"], json!(1));
    }

    #[tokio::test]
    async fn test_only_heads_without_membership_are_removed() {
        let env = TestEnvironment::new().await.unwrap();
        let head = env.seeded.head_relationship_type_id;
        let household = env.store.insert("Contact", json!({ "contact_type": "Household" }));
        let surplus = env.store.insert("Contact", json!({ "contact_type": "Individual" }));
        let member = env.store.insert("Contact", json!({ "contact_type": "Individual" }));
        let deleted = env.store.insert("Contact", json!({ "contact_type": "Individual", "is_deleted": 1 }));
        let organization = env.store.insert("Contact", json!({ "contact_type": "Organization" }));
        for contact in [surplus, member, deleted, organization] {
            env.store.insert(
                "Relationship",
                json!({ "relationship_type_id": head, "contact_id_a": contact, "contact_id_b": household }),
            );
        }
        env.store.insert("Membership", json!({ "contact_id": member }));

        assert_eq!(remove_surplus_heads(&env.context).await.unwrap(), 1);
        assert!(env.store.find("Contact", json!({ "id": surplus })).is_empty());
        assert_eq!(env.store.count("Contact"), 4);
    }

    #[tokio::test]
    async fn test_undeletable_head_is_logged_and_skipped() {
        let env = TestEnvironment::new().await.unwrap();
        let individual = env.store.insert("Contact", json!({ "contact_type": "Individual" }));
        env.store.insert(
            "Relationship",
            json!({ "relationship_type_id": env.seeded.head_relationship_type_id,
                    "contact_id_a": individual, "contact_id_b": 10 }),
        );
        env.store.reject("Contact", "delete", "in use");

        assert_eq!(remove_surplus_heads(&env.context).await.unwrap(), 0);
        assert!(env.log.contains(
            Severity::Waarschuwing,
            &format!("Kon contact met ID {individual} niet verwijderen")
        ));
    }

    #[tokio::test]
    async fn test_unknown_contact_type_stops_head_cleanup() {
        let env = TestEnvironment::new().await.unwrap();
        let pet = env.store.insert("Contact", json!({ "contact_type": "Pet" }));
        env.store.insert(
            "Relationship",
            json!({ "relationship_type_id": env.seeded.head_relationship_type_id,
                    "contact_id_a": pet, "contact_id_b": 10 }),
        );

        let err = remove_surplus_heads(&env.context).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(env.store.calls_to("Contact", "delete"), 0);
    }

    #[tokio::test]
    async fn test_membership_defaults_are_corrected() {
        let env = TestEnvironment::new().await.unwrap();
        let seasons = env.store.insert("CustomField", json!({ "name": "velt_seizoenen_post" }));
        let origin = env.store.insert("CustomField", json!({ "name": "vld_herkomst" }));
        env.store.insert(
            "OptionValue",
            json!({ "option_group_id": "velt_herkomst_lidmaatschap", "name": "Eigen_aanmelding", "value": "4" }),
        );
        let first = env.store.insert("Membership", json!({ "contact_id": 10 }));
        env.store.insert("Membership", json!({ "contact_id": 11 }));

        assert_eq!(correct_membership_defaults(&env.context).await.unwrap(), 2);
        let updated = env.store.find("Membership", json!({ "id": first }));
        assert_eq!(updated[0][format!("custom_{seasons}").as_str()], json!(1));
        assert_eq!(updated[0][format!("custom_{origin}").as_str()], json!(4));
        assert_eq!(updated[0]["contact_id"], json!(10));
    }

    #[tokio::test]
    async fn test_missing_origin_option_is_fatal() {
        let env = TestEnvironment::new().await.unwrap();
        env.store.insert("Membership", json!({ "contact_id": 10 }));

        let err = correct_membership_defaults(&env.context).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Eigen_aanmelding"));
        assert_eq!(env.store.calls_to("Membership", "create"), 0);
    }

    #[tokio::test]
    async fn test_clear_memberships_deletes_one_batch() {
        let env = TestEnvironment::new().await.unwrap();
        for contact in 10..13 {
            env.store.insert("Membership", json!({ "contact_id": contact }));
        }

        assert_eq!(clear_memberships(&env.context, Some(2)).await.unwrap(), 2);
        assert_eq!(env.store.count("Membership"), 1);
        assert_eq!(clear_memberships(&env.context, None).await.unwrap(), 1);
        assert_eq!(clear_memberships(&env.context, None).await.unwrap(), 0);
    }
}
