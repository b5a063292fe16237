//! Domain-record extraction from tool results.
//!
//! Best effort: payloads that don't look like records yield nothing.

use serde_json::{Map, Value};

use super::types::DomainRecord;

/// Keys under which arrays of records are recognized.
const ARRAY_KEYS: &[&str] = &["data", "signups", "people", "results"];

/// Fields that mark a bare object as a person record.
const PERSON_FIELDS: &[&str] = &["email", "first_name", "last_name"];

/// Extract every recognizable record from a tool result payload.
pub fn extract_records(payload: &Value) -> Vec<DomainRecord> {
    let parsed;
    let payload = match payload {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => return Vec::new(),
        },
        other => other,
    };

    if let Value::Array(items) = payload {
        return items.iter().filter_map(record_from).collect();
    }

    let Some(root) = payload.as_object() else {
        return Vec::new();
    };

    for key in ARRAY_KEYS {
        if let Some(Value::Array(items)) = root.get(*key) {
            return items.iter().filter_map(record_from).collect();
        }
    }

    if let Some(single) = root.get("data").and_then(record_from) {
        return vec![single];
    }
    record_from(payload).into_iter().collect()
}

/// One object → record, when it has an id and record-like fields.
fn record_from(value: &Value) -> Option<DomainRecord> {
    let obj = value.as_object()?;
    let id = match obj.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let attributes = match obj.get("attributes") {
        Some(Value::Object(attrs)) => attrs.clone(),
        _ => {
            if !PERSON_FIELDS.iter().any(|f| obj.contains_key(*f)) {
                return None;
            }
            obj.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "id" | "type"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    };

    let record_type = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("signups")
        .to_string();

    Some(DomainRecord {
        id,
        record_type,
        display_name: display_name(&attributes),
        email: string_field(&attributes, "email"),
        attributes,
    })
}

fn display_name(attrs: &Map<String, Value>) -> Option<String> {
    if let Some(full) = string_field(attrs, "full_name").or_else(|| string_field(attrs, "name")) {
        return Some(full);
    }
    let parts: Vec<String> = ["first_name", "last_name"]
        .iter()
        .filter_map(|k| string_field(attrs, k))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn string_field(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_json_api_record() {
        let records = extract_records(&json!({
            "data": {"id": "5", "type": "signups", "attributes": {"first_name": "John", "last_name": "Doe", "email": "john@example.com"}}
        }));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "5");
        assert_eq!(records[0].display_name.as_deref(), Some("John Doe"));
        assert_eq!(records[0].email.as_deref(), Some("john@example.com"));
    }

    #[test]
    fn test_array_under_known_key() {
        let records = extract_records(&json!({
            "people": [
                {"id": 1, "first_name": "Ada"},
                {"id": 2, "email": "b@example.com"},
                {"no_id": true}
            ]
        }));
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(records[0].display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_string_payload_is_parsed() {
        let text = r#"{"data": [{"id": "9", "type": "donations", "attributes": {"amount_in_cents": 100}}]}"#;
        let records = extract_records(&json!(text));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, "donations");
        assert!(records[0].display_name.is_none());
    }

    #[test]
    fn test_non_matching_payloads_yield_nothing() {
        assert!(extract_records(&json!("plain text result")).is_empty());
        assert!(extract_records(&json!({"status": "ok"})).is_empty());
        assert!(extract_records(&json!(42)).is_empty());
        assert!(extract_records(&json!({"id": "3", "status": "ok"})).is_empty());
    }
}
