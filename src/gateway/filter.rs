use super::WireRecord;
use crate::codec::wire::{id_to_json, value_to_json};
use crate::core::{DocumentId, ID_FIELD, Value};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Equality predicate over record fields, with optional ordering and limit.
///
/// A condition on a list-valued field matches when the list contains the
/// value. A condition on `Null` also matches records lacking the field.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Option<JsonValue>)>,
    sort: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &DocumentId) -> Self {
        Self {
            conditions: vec![(ID_FIELD.to_string(), Some(id_to_json(id)))],
            ..Self::default()
        }
    }

    /// Adds an equality condition. Values without a wire form (non-finite
    /// floats) match nothing.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let json = value_to_json(&value.into()).ok();
        self.conditions.push((field.into(), json));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, Option<&JsonValue>)> {
        self.conditions
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_ref()))
    }

    pub fn sort(&self) -> Option<(&str, SortOrder)> {
        self.sort.as_ref().map(|(field, order)| (field.as_str(), *order))
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, record: &WireRecord) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            let Some(expected) = expected else {
                return false;
            };
            match record.get(field) {
                None => expected.is_null(),
                Some(JsonValue::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
            }
        })
    }

    /// Orders two records by the sort key, if one was requested.
    pub fn compare(&self, a: &WireRecord, b: &WireRecord) -> Ordering {
        let Some((field, order)) = &self.sort else {
            return Ordering::Equal;
        };
        let ordering = compare_json(a.get(field), b.get(field));
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Some(value) => write!(f, "{}: {}", field, value)?,
                None => write!(f, "{}: <unmatchable>", field)?,
            }
        }
        write!(f, "}}")
    }
}

fn rank(value: Option<&JsonValue>) -> u8 {
    match value {
        None | Some(JsonValue::Null) => 0,
        Some(JsonValue::Bool(_)) => 1,
        Some(JsonValue::Number(_)) => 2,
        Some(JsonValue::String(_)) => 3,
        Some(JsonValue::Object(_)) => 4,
        Some(JsonValue::Array(_)) => 5,
    }
}

/// Total order over JSON values: missing/null first, then by type, then by value.
pub(crate) fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        // Tagged objects ($date, $oid) compare by their serialized form.
        (Some(x @ JsonValue::Object(_)), Some(y @ JsonValue::Object(_))) => {
            x.to_string().cmp(&y.to_string())
        }
        (Some(JsonValue::Array(x)), Some(JsonValue::Array(y))) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_json(Some(left), Some(right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> WireRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_and_membership() {
        let doc = record(json!({"name": "Asset A", "tags": ["a", "b"]}));

        assert!(Filter::new().eq("name", "Asset A").matches(&doc));
        assert!(!Filter::new().eq("name", "Asset B").matches(&doc));
        assert!(Filter::new().eq("tags", "b").matches(&doc));
        assert!(Filter::new().eq("missing", Value::Null).matches(&doc));
        assert!(Filter::new().matches(&doc));
    }

    #[test]
    fn nan_never_matches() {
        let doc = record(json!({"score": 1.0}));
        assert!(!Filter::new().eq("score", f64::NAN).matches(&doc));
    }

    #[test]
    fn sorts_numbers_and_missing_values() {
        let filter = Filter::new().order_by("n", SortOrder::Descending);
        let a = record(json!({"n": 1}));
        let b = record(json!({"n": 2.5}));
        let c = record(json!({}));

        assert_eq!(filter.compare(&a, &b), Ordering::Greater);
        assert_eq!(filter.compare(&c, &a), Ordering::Greater);
    }
}
