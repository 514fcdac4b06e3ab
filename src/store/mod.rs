//! # Record Store
//!
//! Client side of the CRM's transactional record API (CiviCRM API v3).
//! Every persistent write of the migration goes through [`RecordStore::call`];
//! the provided helpers interpret the API's response shapes so callers deal
//! in plain records.
//!
//! Two adapters exist: [`rest::CiviRestStore`] talks to a live CRM over HTTP,
//! `test_helpers::InMemoryStore` keeps records in memory for tests.

pub mod rest;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub use rest::CiviRestStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store refused the call (validation exception, constraint, ...)
    #[error("{entity}.{action} rejected: {message}")]
    Rejected {
        entity: String,
        action: String,
        message: String,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response from {entity}.{action}: {reason}")]
    InvalidResponse {
        entity: String,
        action: String,
        reason: String,
    },
    #[error("No {entity} record matched")]
    NotFound { entity: String },
}

impl StoreError {
    pub fn rejected(entity: &str, action: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            entity: entity.to_string(),
            action: action.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_response(entity: &str, action: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            entity: entity.to_string(),
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A record as returned by the store
pub type Record = Map<String, Value>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Execute `entity.action` with `params` and return the raw response
    async fn call(&self, entity: &str, action: &str, params: Value) -> StoreResult<Value>;

    /// Create (or update, when `params` carries an `id`) one record
    async fn create(&self, entity: &str, params: Value) -> StoreResult<Record> {
        self.create_with(entity, "create", params).await
    }

    /// Create through an entity-specific action such as `createfull`
    async fn create_with(&self, entity: &str, action: &str, params: Value) -> StoreResult<Record> {
        let response = self.call(entity, action, with_sequential(params)).await?;
        first_value(&response)
            .cloned()
            .ok_or_else(|| StoreError::invalid_response(entity, action, "no record in values"))
    }

    /// All records matching `params`, without the default row limit
    async fn get(&self, entity: &str, params: Value) -> StoreResult<Vec<Record>> {
        let mut params = with_sequential(params);
        if let Some(obj) = params.as_object_mut() {
            obj.entry("options").or_insert_with(|| json!({ "limit": 0 }));
        }
        let response = self.call(entity, "get", params).await?;
        let values = response
            .get("values")
            .ok_or_else(|| StoreError::invalid_response(entity, "get", "missing values"))?;
        Ok(records_of(values))
    }

    /// Exactly one matching record; zero or several are an error
    async fn get_single(&self, entity: &str, params: Value) -> StoreResult<Record> {
        let response = self.call(entity, "getsingle", params).await?;
        match response {
            Value::Object(mut record) => {
                record.remove("is_error");
                Ok(record)
            }
            _ => Err(StoreError::invalid_response(entity, "getsingle", "expected an object")),
        }
    }

    /// One field of exactly one matching record
    async fn get_value(&self, entity: &str, field: &str, params: Value) -> StoreResult<Value> {
        let mut params = params;
        if let Some(obj) = params.as_object_mut() {
            obj.insert("return".to_string(), Value::String(field.to_string()));
        }
        let response = self.call(entity, "getvalue", params).await?;
        Ok(unwrap_result(response))
    }

    async fn get_count(&self, entity: &str, params: Value) -> StoreResult<i64> {
        let response = self.call(entity, "getcount", params).await?;
        let value = unwrap_result(response);
        as_i64(&value)
            .ok_or_else(|| StoreError::invalid_response(entity, "getcount", "count is not numeric"))
    }

    async fn delete(&self, entity: &str, id: i64) -> StoreResult<()> {
        self.call(entity, "delete", json!({ "id": id })).await?;
        Ok(())
    }
}

fn with_sequential(mut params: Value) -> Value {
    if let Some(obj) = params.as_object_mut() {
        obj.insert("sequential".to_string(), json!(1));
    }
    params
}

/// `getvalue`/`getcount` answer either with a bare scalar or `{"result": ..}`
fn unwrap_result(response: Value) -> Value {
    match response {
        Value::Object(mut obj) if obj.contains_key("result") => {
            obj.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn first_value(response: &Value) -> Option<&Record> {
    match response.get("values")? {
        Value::Array(items) => items.first().and_then(Value::as_object),
        Value::Object(map) => map.values().next().and_then(Value::as_object),
        _ => None,
    }
}

fn records_of(values: &Value) -> Vec<Record> {
    match values {
        Value::Array(items) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
        Value::Object(map) => map.values().filter_map(|v| v.as_object().cloned()).collect(),
        _ => Vec::new(),
    }
}

/// The API returns ids and counts as numbers or numeric strings
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id of a record returned by the store
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(as_i64)
}

/// Whether an `is_*` flag is set; the API mixes booleans, numbers and strings
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_result_accepts_both_shapes() {
        assert_eq!(unwrap_result(json!(3)), json!(3));
        assert_eq!(unwrap_result(json!({ "is_error": 0, "result": "7" })), json!("7"));
    }

    #[test]
    fn test_first_value_handles_keyed_and_sequential_values() {
        let keyed = json!({ "id": 5, "values": { "5": { "id": "5", "email": "a@b.be" } } });
        assert_eq!(record_id(first_value(&keyed).unwrap()), Some(5));

        let sequential = json!({ "id": 6, "values": [{ "id": 6 }] });
        assert_eq!(record_id(first_value(&sequential).unwrap()), Some(6));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(as_i64(&json!("12")), Some(12));
        assert_eq!(as_i64(&json!(12)), Some(12));
        assert_eq!(as_i64(&json!("twelve")), None);
        assert!(is_truthy(Some(&json!("1"))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(None));
    }
}
