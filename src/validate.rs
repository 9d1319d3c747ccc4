//! Schema-driven validation, run before every save.
//!
//! Rules run in order and the first failure wins. The default chain checks
//! required fields first (one aggregate error naming every missing field,
//! embedded ones included) and then the kind of every present value.
//! References are not followed.

use crate::core::{OdmError, Record, Result, Value};
use crate::schema::descriptor::embedded_schema;
use crate::schema::{FieldKind, Schema, SchemaRegistry};

pub trait ValidationRule: Send + Sync {
    fn validate(&self, registry: &SchemaRegistry, schema: &Schema, record: &Record) -> Result<()>;
}

/// Every required field must be present, recursively through embedded values.
#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsRule;

impl RequiredFieldsRule {
    /// Paths of missing required fields, e.g. `comment.text` or `items[1].text`.
    pub fn missing(&self, registry: &SchemaRegistry, schema: &Schema, record: &Record) -> Vec<String> {
        let mut missing = Vec::new();
        collect_missing(registry, schema, record, "", &mut missing);
        missing
    }
}

impl ValidationRule for RequiredFieldsRule {
    fn validate(&self, registry: &SchemaRegistry, schema: &Schema, record: &Record) -> Result<()> {
        let missing = self.missing(registry, schema, record);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OdmError::Validation {
                type_name: schema.type_name().to_string(),
                fields: missing,
            })
        }
    }
}

fn collect_missing(
    registry: &SchemaRegistry,
    schema: &Schema,
    record: &Record,
    prefix: &str,
    out: &mut Vec<String>,
) {
    let fields = record.snapshot();
    for field in schema.fields() {
        let path = format!("{}{}", prefix, field.name());
        match fields.get(field.name()) {
            None if field.is_required() => out.push(path),
            None => {}
            Some(value) => collect_nested(registry, field.kind(), value, &path, out),
        }
    }
}

fn collect_nested(
    registry: &SchemaRegistry,
    kind: &FieldKind,
    value: &Value,
    path: &str,
    out: &mut Vec<String>,
) {
    match (kind, value) {
        (FieldKind::Embedded(types), Value::Embedded(record)) => {
            if let Ok(schema) = embedded_schema(registry, types, record) {
                collect_missing(registry, &schema, record, &format!("{}.", path), out);
            }
        }
        (FieldKind::ListOf(element), Value::List(items)) => {
            for (idx, item) in items.iter().enumerate() {
                collect_nested(registry, element, item, &format!("{}[{}]", path, idx), out);
            }
        }
        _ => {}
    }
}

/// Every present declared field must hold a value its kind accepts.
#[derive(Debug, Clone, Default)]
pub struct FieldKindRule;

impl ValidationRule for FieldKindRule {
    fn validate(&self, registry: &SchemaRegistry, schema: &Schema, record: &Record) -> Result<()> {
        for (name, value) in record.snapshot() {
            if let Some(field) = schema.field(&name) {
                field.validate(&value, registry)?;
            }
        }
        Ok(())
    }
}

/// Ordered chain of [`ValidationRule`]s.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![Box::new(RequiredFieldsRule), Box::new(FieldKindRule)],
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule that runs after the built-in checks.
    pub fn with_rule<R: ValidationRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Runs every rule. Does not touch the record, so repeated calls on
    /// an unchanged record give the same outcome.
    pub fn validate(&self, registry: &SchemaRegistry, schema: &Schema, record: &Record) -> Result<()> {
        for rule in &self.rules {
            rule.validate(registry, schema, record)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TYPE_FIELD;
    use crate::schema::{Field, ScalarKind, TypeDecl};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_type(TypeDecl::embedded("Comment").field(Field::text("text").required()))
            .unwrap()
            .with_type(
                TypeDecl::document("User")
                    .field(Field::text("name").required())
                    .field(Field::text("last_name").required())
                    .field(Field::integer("age"))
                    .field(Field::embedded("bio", ["Comment"]))
                    .field(Field::list_of("comments", FieldKind::embedded(["Comment"])))
                    .field(Field::list_of("tags", FieldKind::scalar([ScalarKind::Text]))),
            )
            .unwrap()
    }

    fn comment(text: Option<&str>) -> Value {
        let record = Record::new();
        record.insert(TYPE_FIELD, Value::from("Comment"));
        if let Some(text) = text {
            record.insert("text", Value::from(text));
        }
        Value::Embedded(record)
    }

    #[test]
    fn aggregates_every_missing_field() {
        let registry = registry();
        let schema = registry.resolve("User").unwrap();
        let record = Record::new();
        record.insert("age", Value::from(3));

        let err = Validator::new().validate(&registry, &schema, &record).unwrap_err();
        assert_eq!(err.missing_fields(), &["name", "last_name"]);
        assert!(err.to_string().contains("'User'"));
    }

    #[test]
    fn descends_into_embedded_values() {
        let registry = registry();
        let schema = registry.resolve("User").unwrap();
        let record = Record::new();
        record.insert("name", Value::from("Frank"));
        record.insert("last_name", Value::from("Footer"));
        record.insert("bio", comment(None));
        record.insert("comments", Value::List(vec![comment(Some("ok")), comment(None)]));

        let err = Validator::new().validate(&registry, &schema, &record).unwrap_err();
        assert_eq!(err.missing_fields(), &["bio.text", "comments[1].text"]);
    }

    #[test]
    fn rejects_wrong_kinds_once_complete() {
        let registry = registry();
        let schema = registry.resolve("User").unwrap();
        let record = Record::new();
        record.insert("name", Value::from("Frank"));
        record.insert("last_name", Value::from("Footer"));
        record.insert("tags", Value::List(vec![Value::from("a"), Value::from(2)]));

        let err = Validator::new().validate(&registry, &schema, &record).unwrap_err();
        assert!(matches!(err, OdmError::TypeMismatch(_)));
    }

    #[test]
    fn repeated_validation_gives_the_same_outcome() {
        let registry = registry();
        let schema = registry.resolve("User").unwrap();
        let record = Record::new();
        record.insert("name", Value::from("Frank"));
        let validator = Validator::new();

        let first = validator.validate(&registry, &schema, &record).unwrap_err();
        let second = validator.validate(&registry, &schema, &record).unwrap_err();
        assert_eq!(first.missing_fields(), second.missing_fields());
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn custom_rules_run_after_builtins() {
        struct NoMinors;
        impl ValidationRule for NoMinors {
            fn validate(&self, _: &SchemaRegistry, _: &Schema, record: &Record) -> Result<()> {
                match record.get("age").and_then(|v| v.as_i64()) {
                    Some(age) if age < 18 => Err(OdmError::TypeMismatch("age below 18".into())),
                    _ => Ok(()),
                }
            }
        }

        let registry = registry();
        let schema = registry.resolve("User").unwrap();
        let record = Record::new();
        record.insert("name", Value::from("Frank"));
        record.insert("last_name", Value::from("Footer"));
        record.insert("age", Value::from(12));

        assert!(Validator::new().validate(&registry, &schema, &record).is_ok());
        assert!(Validator::new()
            .with_rule(NoMinors)
            .validate(&registry, &schema, &record)
            .is_err());
    }
}
