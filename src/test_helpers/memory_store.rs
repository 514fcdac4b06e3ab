//! In-memory [`RecordStore`] answering in the CRM API v3 response shapes.

use crate::store::{as_i64, Record, RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Parameters that steer the API rather than filter records
const RESERVED_PARAMS: &[&str] = &["sequential", "options", "return", "check_permissions"];

#[derive(Debug, Clone)]
struct Rejection {
    entity: String,
    action: String,
    /// Only reject calls whose params carry this field/value
    matching: Option<(String, Value)>,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Record>>,
    next_id: i64,
    rejections: Vec<Rejection>,
    calls: Vec<(String, String)>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Table-per-entity store with auto ids, equality and `IN` filters.
///
/// `create` with an `id` updates the existing record. Rejections can be
/// programmed per entity/action to simulate store validation exceptions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing rejections; returns its id
    pub fn insert(&self, entity: &str, record: Value) -> i64 {
        let mut state = self.state.lock();
        let mut record = record.as_object().cloned().unwrap_or_default();
        let id = match record.get("id").and_then(as_i64) {
            Some(id) => {
                state.next_id = state.next_id.max(id);
                id
            }
            None => state.allocate_id(),
        };
        record.insert("id".to_string(), json!(id));
        state.tables.entry(entity.to_string()).or_default().push(record);
        id
    }

    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Records of `entity` matching the filter object `params`
    pub fn find(&self, entity: &str, params: Value) -> Vec<Record> {
        let state = self.state.lock();
        let filters = filters_of(&params);
        state
            .tables
            .get(entity)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(r, &filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, entity: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(entity)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn remove_where(&self, entity: &str, field: &str, value: &str) {
        if let Some(rows) = self.state.lock().tables.get_mut(entity) {
            rows.retain(|r| r.get(field).and_then(scalar_key).as_deref() != Some(value));
        }
    }

    /// Reject every `entity.action` call from now on
    pub fn reject(&self, entity: &str, action: &str, message: &str) {
        self.state.lock().rejections.push(Rejection {
            entity: entity.to_string(),
            action: action.to_string(),
            matching: None,
            message: message.to_string(),
        });
    }

    /// Reject `entity.action` calls whose params carry `field == value`
    pub fn reject_matching(&self, entity: &str, action: &str, field: &str, value: Value, message: &str) {
        self.state.lock().rejections.push(Rejection {
            entity: entity.to_string(),
            action: action.to_string(),
            matching: Some((field.to_string(), value)),
            message: message.to_string(),
        });
    }

    pub fn clear_rejections(&self) {
        self.state.lock().rejections.clear();
    }

    /// Every `(entity, action)` received through [`RecordStore::call`]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, entity: &str, action: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(e, a)| e == entity && a == action)
            .count()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn call(&self, entity: &str, action: &str, params: Value) -> StoreResult<Value> {
        let mut state = self.state.lock();
        state.calls.push((entity.to_string(), action.to_string()));

        let rejected = state.rejections.iter().find(|r| {
            r.entity == entity
                && r.action.eq_ignore_ascii_case(action)
                && r.matching.as_ref().map_or(true, |(field, value)| {
                    params.get(field).and_then(scalar_key) == scalar_key(value)
                })
        });
        if let Some(rejection) = rejected {
            return Err(StoreError::rejected(entity, action, rejection.message.clone()));
        }

        match action.to_ascii_lowercase().as_str() {
            "create" | "createfull" => Ok(create_record(&mut state, entity, &params)),
            "get" => {
                let values = select(&state, entity, &params);
                Ok(json!({ "is_error": 0, "count": values.len(), "values": values }))
            }
            "getsingle" => {
                let mut values = select(&state, entity, &params);
                if values.len() != 1 {
                    return Err(StoreError::rejected(
                        entity,
                        action,
                        format!("Expected one {entity} but found {}", values.len()),
                    ));
                }
                let mut record = values.remove(0);
                record.insert("is_error".to_string(), json!(0));
                Ok(Value::Object(record))
            }
            "getvalue" => {
                let field = params
                    .get("return")
                    .and_then(Value::as_str)
                    .unwrap_or("id")
                    .to_string();
                let values = select(&state, entity, &params);
                if values.len() != 1 {
                    return Err(StoreError::rejected(
                        entity,
                        action,
                        format!("Expected one {entity} but found {}", values.len()),
                    ));
                }
                match values[0].get(&field) {
                    Some(value) => Ok(json!({ "is_error": 0, "result": value })),
                    None => Err(StoreError::rejected(entity, action, format!("{field} not set"))),
                }
            }
            "getcount" => {
                let count = select(&state, entity, &params).len();
                Ok(json!({ "is_error": 0, "result": count }))
            }
            "delete" => {
                let id = params.get("id").and_then(as_i64);
                let rows = state.tables.entry(entity.to_string()).or_default();
                let before = rows.len();
                rows.retain(|r| r.get("id").and_then(as_i64) != id);
                if rows.len() == before {
                    return Err(StoreError::rejected(entity, action, "Could not delete entity"));
                }
                Ok(json!({ "is_error": 0, "count": 1, "values": 1 }))
            }
            other => Err(StoreError::rejected(
                entity,
                action,
                format!("API ({entity}, {other}) does not exist"),
            )),
        }
    }
}

fn create_record(state: &mut State, entity: &str, params: &Value) -> Value {
    let mut fields = Map::new();
    if let Some(obj) = params.as_object() {
        for (key, value) in obj {
            if !RESERVED_PARAMS.contains(&key.as_str()) && !key.starts_with("api.") {
                fields.insert(key.clone(), value.clone());
            }
        }
    }

    let existing_id = fields.get("id").and_then(as_i64);
    if let Some(id) = existing_id {
        if let Some(record) = state
            .tables
            .get_mut(entity)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id").and_then(as_i64) == Some(id)))
        {
            for (key, value) in fields {
                record.insert(key, value);
            }
            let record = record.clone();
            return json!({ "is_error": 0, "id": id, "count": 1, "values": [record] });
        }
    }

    let id = existing_id.unwrap_or_else(|| state.allocate_id());
    fields.insert("id".to_string(), json!(id));
    if entity == "SepaMandate" {
        // createfull also creates the recurring contribution
        let recur_id = state.allocate_id();
        fields.insert("entity_id".to_string(), json!(recur_id));
    }
    state
        .tables
        .entry(entity.to_string())
        .or_default()
        .push(fields.clone());
    json!({ "is_error": 0, "id": id, "count": 1, "values": [fields] })
}

fn select(state: &State, entity: &str, params: &Value) -> Vec<Record> {
    let filters = filters_of(params);
    // `options.limit` of 0 (or absent) means unlimited
    let limit = params
        .get("options")
        .and_then(|options| options.get("limit"))
        .and_then(as_i64)
        .filter(|limit| *limit > 0)
        .map_or(usize::MAX, |limit| limit as usize);
    state
        .tables
        .get(entity)
        .map(|rows| {
            rows.iter()
                .filter(|r| matches_all(r, &filters))
                .take(limit)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn filters_of(params: &Value) -> Vec<(&str, &Value)> {
    params
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()) && !k.starts_with("api."))
                .map(|(k, v)| (k.as_str(), v))
                .collect()
        })
        .unwrap_or_default()
}

fn matches_all(record: &Record, filters: &[(&str, &Value)]) -> bool {
    filters
        .iter()
        .all(|(field, expected)| matches(record.get(*field), expected))
}

fn matches(actual: Option<&Value>, expected: &Value) -> bool {
    match expected {
        Value::Object(op) => {
            if let Some(Value::Array(options)) = op.get("IN") {
                let actual = actual.and_then(scalar_key);
                return options.iter().any(|o| scalar_key(o) == actual && actual.is_some());
            }
            if op.contains_key("IS NULL") {
                return actual.map_or(true, Value::is_null);
            }
            if op.contains_key("IS NOT NULL") {
                return actual.is_some_and(|v| !v.is_null());
            }
            false
        }
        Value::Null => actual.map_or(true, Value::is_null),
        _ => match actual {
            Some(value) => scalar_key(value) == scalar_key(expected),
            None => false,
        },
    }
}

/// Comparison key: the API treats `"12"`, `12` and `true`/`1` alike
fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_filter() {
        let store = InMemoryStore::new();
        store
            .create("Email", json!({ "contact_id": 4, "email": "a@velt.be", "is_primary": 1 }))
            .await
            .unwrap();
        store
            .create("Email", json!({ "contact_id": 5, "email": "b@velt.be" }))
            .await
            .unwrap();

        let found = store.get("Email", json!({ "contact_id": "4" })).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            store.get_count("Email", json!({ "is_primary": 1 })).await.unwrap(),
            1
        );
        let both = store
            .get("Email", json!({ "contact_id": { "IN": [4, 5] } }))
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
    }

    #[tokio::test]
    async fn test_create_with_id_updates() {
        let store = InMemoryStore::new();
        let id = store.insert("Membership", json!({ "start_date": "2018-01-01" }));
        store
            .create("Membership", json!({ "id": id, "start_date": "2017-05-01" }))
            .await
            .unwrap();
        let records = store.records("Membership");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["start_date"], json!("2017-05-01"));
    }

    #[tokio::test]
    async fn test_programmed_rejection() {
        let store = InMemoryStore::new();
        store.reject_matching("Email", "create", "email", json!("x@velt.be"), "duplicate");
        assert!(store.create("Email", json!({ "email": "x@velt.be" })).await.is_err());
        assert!(store.create("Email", json!({ "email": "y@velt.be" })).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_honours_option_limit() {
        let store = InMemoryStore::new();
        for _ in 0..3 {
            store.insert("Membership", json!({ "contact_id": 4 }));
        }
        let limited = store
            .get("Membership", json!({ "options": { "limit": 2 } }))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(store.get("Membership", json!({})).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_getvalue_requires_single_match() {
        let store = InMemoryStore::new();
        store.insert("Country", json!({ "iso_code": "BE" }));
        store.insert("Country", json!({ "iso_code": "BE" }));
        assert!(store
            .get_value("Country", "id", json!({ "iso_code": "BE" }))
            .await
            .is_err());
    }
}
