//! Record wire shape.
//!
//! Records travel to and from the gateway as JSON objects. Primitives map to
//! their JSON counterparts; values JSON cannot tell apart are tagged:
//!
//! | value | wire form |
//! |---|---|
//! | timestamp | `{"$date": "<rfc3339>"}` |
//! | identity | `{"$oid": "<uuid>"}` |
//! | reference | `{"$ref": "<type>", "$id": "<uuid>"}` |
//! | embedded record | nested object with its own `_type` |

use crate::core::{DocumentId, FieldMap, OdmError, Record, Reference, Result, Value};
use crate::gateway::WireRecord;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value as JsonValue};

const DATE_TAG: &str = "$date";
const OID_TAG: &str = "$oid";
const REF_TAG: &str = "$ref";
const REF_ID_TAG: &str = "$id";

pub fn id_to_json(id: &DocumentId) -> JsonValue {
    let mut tagged = Map::new();
    tagged.insert(OID_TAG.to_string(), JsonValue::String(id.to_string()));
    JsonValue::Object(tagged)
}

/// Reads an identity in tagged (`{"$oid": ..}`) or bare string form.
pub fn id_from_json(value: &JsonValue) -> Result<DocumentId> {
    let raw = match value {
        JsonValue::String(raw) => raw,
        JsonValue::Object(map) if map.len() == 1 => match map.get(OID_TAG) {
            Some(JsonValue::String(raw)) => raw,
            _ => return Err(invalid("identity object must be {\"$oid\": <uuid>}")),
        },
        other => return Err(invalid(format!("identity must be a string, got {}", other))),
    };
    raw.parse()
        .map_err(|err| invalid(format!("malformed identity '{}': {}", raw, err)))
}

pub fn value_to_json(value: &Value) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::Number(Number::from(*i)),
        Value::Float(f) => JsonValue::Number(
            Number::from_f64(*f)
                .ok_or_else(|| invalid(format!("{} has no wire representation", f)))?,
        ),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Timestamp(t) => {
            let mut tagged = Map::new();
            tagged.insert(DATE_TAG.to_string(), JsonValue::String(t.to_rfc3339()));
            JsonValue::Object(tagged)
        }
        Value::Id(id) => id_to_json(id),
        Value::Reference(reference) => {
            let mut tagged = Map::new();
            tagged.insert(
                REF_TAG.to_string(),
                JsonValue::String(reference.type_name.clone()),
            );
            tagged.insert(REF_ID_TAG.to_string(), JsonValue::String(reference.id.to_string()));
            JsonValue::Object(tagged)
        }
        Value::Embedded(record) => JsonValue::Object(to_wire(&record.snapshot())?),
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

pub fn value_from_json(value: JsonValue) -> Result<Value> {
    Ok(match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(items) => Value::List(
            items
                .into_iter()
                .map(value_from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        JsonValue::Object(map) => object_from_json(map)?,
    })
}

fn object_from_json(map: Map<String, JsonValue>) -> Result<Value> {
    if map.len() == 1 {
        if let Some(JsonValue::String(raw)) = map.get(DATE_TAG) {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|err| invalid(format!("malformed date '{}': {}", raw, err)))?;
            return Ok(Value::Timestamp(parsed.with_timezone(&Utc)));
        }
        if map.contains_key(OID_TAG) {
            return Ok(Value::Id(id_from_json(&JsonValue::Object(map))?));
        }
    }
    if map.len() == 2
        && let (Some(JsonValue::String(type_name)), Some(raw_id)) =
            (map.get(REF_TAG), map.get(REF_ID_TAG))
    {
        let id = id_from_json(raw_id)?;
        return Ok(Value::Reference(Reference::new(type_name.clone(), id)));
    }
    Ok(Value::Embedded(Record::from_fields(from_wire(map)?)))
}

/// Converts a field mapping to wire shape. Embedded records are copied.
pub fn to_wire(fields: &FieldMap) -> Result<WireRecord> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), value_to_json(value)?)))
        .collect()
}

/// Converts a wire record to a fresh field mapping.
pub fn from_wire(record: WireRecord) -> Result<FieldMap> {
    record
        .into_iter()
        .map(|(name, value)| Ok((name, value_from_json(value)?)))
        .collect()
}

fn invalid(message: impl Into<String>) -> OdmError {
    OdmError::InvalidRecord(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ID_FIELD, TYPE_FIELD};
    use serde_json::json;

    #[test]
    fn tagged_values_survive_the_wire() {
        let id = DocumentId::new();
        let now = Utc::now();
        let comment = Record::new();
        comment.insert(TYPE_FIELD, Value::from("Comment"));
        comment.insert("text", Value::from("hello"));

        let mut fields = FieldMap::new();
        fields.insert(TYPE_FIELD.to_string(), Value::from("Container"));
        fields.insert(ID_FIELD.to_string(), Value::Id(id));
        fields.insert("created".to_string(), Value::Timestamp(now));
        fields.insert(
            "user".to_string(),
            Value::Reference(Reference::new("User", id)),
        );
        fields.insert("comment".to_string(), Value::Embedded(comment));
        fields.insert("scores".to_string(), Value::from(vec![1.5, 2.0]));

        let wire = to_wire(&fields).unwrap();
        assert_eq!(wire["user"], json!({"$ref": "User", "$id": id.to_string()}));
        assert_eq!(wire["comment"]["_type"], json!("Comment"));

        let back = from_wire(wire).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn wire_copy_is_detached() {
        let comment = Record::new();
        comment.insert("text", Value::from("before"));
        let mut fields = FieldMap::new();
        fields.insert("comment".to_string(), Value::Embedded(comment.clone()));

        let back = from_wire(to_wire(&fields).unwrap()).unwrap();
        comment.insert("text", Value::from("after"));

        match &back["comment"] {
            Value::Embedded(copy) => assert_eq!(copy.get("text"), Some(Value::from("before"))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_non_finite_floats_and_bad_ids() {
        assert!(value_to_json(&Value::Float(f64::INFINITY)).is_err());
        assert!(value_from_json(json!({"$oid": "not-a-uuid"})).is_err());
    }
}
