//! Reference encode/decode with polymorphic dispatch.
//!
//! Decoding reads the stored record's own `_type` rather than the field's
//! declared target, so a `Rig` stored through an `Asset` field comes back as
//! a `Rig`. The discriminator must name the target or one of its registered
//! subtypes; anything else is [`OdmError::UnknownType`].

use super::wire;
use crate::core::{OdmError, Reference, Result, TYPE_FIELD, Value};
use crate::document::{Document, FieldAccess};
use crate::gateway::WireRecord;
use crate::mapper::Mapper;
use crate::schema::{FieldInput, TypeCategory};
use tracing::{Level, event};

pub struct ReferenceCodec<'a> {
    mapper: &'a Mapper,
}

impl<'a> ReferenceCodec<'a> {
    pub fn new(mapper: &'a Mapper) -> Self {
        Self { mapper }
    }

    /// Reference token for `input`, cascade-saving an unsaved document first.
    pub fn encode(&self, input: FieldInput, targets: &[String]) -> Result<Reference> {
        match input {
            FieldInput::Value(Value::Reference(reference)) => {
                self.check_target(targets, &reference.type_name)?;
                Ok(reference)
            }
            FieldInput::Document(document) => {
                self.check_target(targets, document.type_name())?;
                document.to_reference()
            }
            other => Err(OdmError::InvalidReferenceKind(format!(
                "{} cannot be stored as a reference",
                other.kind_name()
            ))),
        }
    }

    fn check_target(&self, targets: &[String], type_name: &str) -> Result<()> {
        let registry = self.mapper.registry();
        if registry.admits(targets, TypeCategory::Document, type_name) {
            return Ok(());
        }
        registry.document_schema(type_name)?;
        Err(OdmError::TypeMismatch(format!(
            "reference to '{}' where {} is expected",
            type_name,
            targets.join("|")
        )))
    }

    /// Fetches the record behind `reference` and binds it to its live instance.
    ///
    /// No mapper lock is held while the gateway is called.
    pub fn decode(&self, reference: &Reference, targets: &[String]) -> Result<Document> {
        let stored_as = self.mapper.registry().document_schema(&reference.type_name)?;
        let collection = stored_as.collection_name()?;
        event!(
            Level::TRACE,
            reference = %reference,
            collection,
            "dereferencing"
        );
        let record = self.mapper.gateway().dereference(collection, reference)?;
        self.decode_record(targets, record)
    }

    /// Decodes a fetched record into the live instance for its identity.
    pub fn decode_record(&self, targets: &[String], record: WireRecord) -> Result<Document> {
        let fields = wire::from_wire(record)?;
        let discriminator = match fields.get(TYPE_FIELD) {
            Some(Value::Text(name)) => name.clone(),
            _ => {
                return Err(OdmError::InvalidRecord(format!(
                    "record carries no '{}' discriminator",
                    TYPE_FIELD
                )));
            }
        };
        let schema = self.mapper.registry().resolve_discriminator(
            targets,
            TypeCategory::Document,
            &discriminator,
        )?;
        self.mapper.adopt(schema, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentId;
    use crate::gateway::InMemoryGateway;
    use crate::schema::{Field, SchemaRegistry, TypeDecl};
    use serde_json::json;
    use std::sync::Arc;

    fn mapper() -> Mapper {
        let registry = SchemaRegistry::new()
            .with_type(TypeDecl::document("Asset").field(Field::text("name")))
            .unwrap()
            .with_type(TypeDecl::document("Model").extends("Asset"))
            .unwrap()
            .with_type(TypeDecl::document("User"))
            .unwrap();
        Mapper::open(registry, Arc::new(InMemoryGateway::default())).unwrap()
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn tokens_pass_through_when_admitted() {
        let mapper = mapper();
        let codec = mapper.codec();
        let token = Reference::new("Model", DocumentId::new());

        let encoded = codec
            .encode(FieldInput::from(token.clone()), &targets(&["Asset"]))
            .unwrap();
        assert_eq!(encoded, token);

        let err = codec
            .encode(FieldInput::from(token), &targets(&["User"]))
            .unwrap_err();
        assert!(matches!(err, OdmError::TypeMismatch(_)));

        let err = codec
            .encode(
                FieldInput::from(Reference::new("Ghost", DocumentId::new())),
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, OdmError::UnknownType(_)));
    }

    #[test]
    fn non_reference_input_is_rejected() {
        let mapper = mapper();
        let err = mapper
            .codec()
            .encode(FieldInput::from("Asset A"), &[])
            .unwrap_err();
        assert!(matches!(err, OdmError::InvalidReferenceKind(_)));
    }

    #[test]
    fn decode_dispatches_on_the_stored_discriminator() {
        let mapper = mapper();
        let id = DocumentId::new();
        let record = json!({
            "_type": "Model",
            "_id": {"$oid": id.to_string()},
            "name": "teapot"
        });

        let document = mapper
            .codec()
            .decode_record(&targets(&["Asset"]), record.as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(document.type_name(), "Model");
        assert_eq!(document.id(), Some(id));
    }

    #[test]
    fn unknown_or_missing_discriminators_are_fatal() {
        let mapper = mapper();
        let codec = mapper.codec();
        let id = json!({"$oid": DocumentId::new().to_string()});

        let drifted = json!({"_type": "Prop", "_id": id.clone()});
        let err = codec
            .decode_record(&targets(&["Asset"]), drifted.as_object().cloned().unwrap())
            .unwrap_err();
        assert!(matches!(err, OdmError::UnknownType(_)));

        let outside = json!({"_type": "User", "_id": id.clone()});
        let err = codec
            .decode_record(&targets(&["Asset"]), outside.as_object().cloned().unwrap())
            .unwrap_err();
        assert!(matches!(err, OdmError::UnknownType(_)));

        let untyped = json!({"_id": id});
        let err = codec
            .decode_record(&[], untyped.as_object().cloned().unwrap())
            .unwrap_err();
        assert!(matches!(err, OdmError::InvalidRecord(_)));
    }
}
