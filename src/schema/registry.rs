use super::field::{FieldDefault, FieldDescriptor, FieldKind, ScalarKind};
use crate::core::{ID_FIELD, OdmError, Record, Result, TYPE_FIELD, Value};
use crate::gateway::{CollectionOptions, IndexOptions};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Top-level record with identity, stored in a collection.
    Document,
    /// Identity-less record stored inline in its parent.
    Embedded,
}

/// Declaration of one type: its own fields plus an optional parent.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    name: String,
    category: TypeCategory,
    parent: Option<String>,
    fields: Vec<FieldDescriptor>,
    collection: Option<CollectionOptions>,
    indexes: Vec<IndexOptions>,
}

impl TypeDecl {
    pub fn document(name: impl Into<String>) -> Self {
        Self::new(name, TypeCategory::Document)
    }

    pub fn embedded(name: impl Into<String>) -> Self {
        Self::new(name, TypeCategory::Embedded)
    }

    fn new(name: impl Into<String>, category: TypeCategory) -> Self {
        Self {
            name: name.into(),
            category,
            parent: None,
            fields: Vec::new(),
            collection: None,
            indexes: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Overrides the collection; subtypes inherit it unless they override it too.
    pub fn collection(mut self, options: CollectionOptions) -> Self {
        self.collection = Some(options);
        self
    }

    pub fn index(mut self, index: IndexOptions) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Merged field table of one registered type.
#[derive(Debug)]
pub struct Schema {
    type_name: String,
    category: TypeCategory,
    lineage: Vec<String>,
    fields: Vec<Arc<FieldDescriptor>>,
    positions: HashMap<String, usize>,
    collection: Option<CollectionOptions>,
    indexes: Vec<IndexOptions>,
}

impl Schema {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    /// Ancestry from the most-base type to this one.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    pub fn is_a(&self, ancestor: &str) -> bool {
        self.lineage.iter().any(|name| name == ancestor)
    }

    pub fn parent(&self) -> Option<&str> {
        self.lineage.iter().rev().nth(1).map(String::as_str)
    }

    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.positions.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name()).collect()
    }

    /// Storage collection; `None` for embedded types.
    pub fn collection(&self) -> Option<&CollectionOptions> {
        self.collection.as_ref()
    }

    pub fn collection_name(&self) -> Result<&str> {
        self.collection
            .as_ref()
            .map(|c| c.name.as_str())
            .ok_or_else(|| {
                OdmError::Configuration(format!(
                    "embedded type '{}' has no collection",
                    self.type_name
                ))
            })
    }

    pub fn indexes(&self) -> &[IndexOptions] {
        &self.indexes
    }

    /// Fills every absent field that has a default. The discriminator is
    /// always this type's name.
    pub(crate) fn apply_defaults(&self, record: &Record) {
        let mut fields = record.write();
        fields
            .entry(TYPE_FIELD.to_string())
            .or_insert_with(|| Value::Text(self.type_name.clone()));
        for field in &self.fields {
            if fields.contains_key(field.name()) {
                continue;
            }
            if let Some(value) = field.default().produce() {
                fields.insert(field.name().to_string(), value);
            }
        }
    }
}

/// Closed registry of declared types, keyed by discriminator.
///
/// Schemas are resolved once, at registration, and never change afterwards;
/// the registry is cheap to clone and is shared read-only by the mapper.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Arc<HashMap<String, Arc<Schema>>>,
    children: Arc<HashMap<String, Vec<String>>>,
    order: Arc<Vec<String>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type and returns the registry, for chained declarations.
    pub fn with_type(mut self, decl: TypeDecl) -> Result<Self> {
        self.register(decl)?;
        Ok(self)
    }

    /// Registers a type. The parent, if any, must already be registered.
    ///
    /// Every inconsistency (bad names, duplicates, incompatible redefinition
    /// of an inherited field, invalid defaults, bad index keys) fails here
    /// with [`OdmError::Configuration`].
    pub fn register(&mut self, decl: TypeDecl) -> Result<Arc<Schema>> {
        validate_name("type", &decl.name)?;
        if self.schemas.contains_key(&decl.name) {
            return Err(OdmError::Configuration(format!(
                "type '{}' is already registered",
                decl.name
            )));
        }

        let parent = match &decl.parent {
            Some(parent_name) => {
                let parent = self.schemas.get(parent_name).cloned().ok_or_else(|| {
                    OdmError::Configuration(format!(
                        "type '{}' extends unregistered type '{}'",
                        decl.name, parent_name
                    ))
                })?;
                if parent.category != decl.category {
                    return Err(OdmError::Configuration(format!(
                        "type '{}' ({:?}) cannot extend '{}' ({:?})",
                        decl.name, decl.category, parent_name, parent.category
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        if decl.category == TypeCategory::Embedded
            && (decl.collection.is_some() || !decl.indexes.is_empty())
        {
            return Err(OdmError::Configuration(format!(
                "embedded type '{}' cannot declare a collection or indexes",
                decl.name
            )));
        }

        let schema = Arc::new(resolve(&decl, parent.as_deref())?);

        Arc::make_mut(&mut self.schemas).insert(decl.name.clone(), schema.clone());
        if let Some(parent_name) = &decl.parent {
            Arc::make_mut(&mut self.children)
                .entry(parent_name.clone())
                .or_default()
                .push(decl.name.clone());
        }
        Arc::make_mut(&mut self.order).push(decl.name);

        Ok(schema)
    }

    /// Merged schema of a registered type.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(type_name)
            .cloned()
            .ok_or_else(|| OdmError::UnknownType(type_name.to_string()))
    }

    pub fn document_schema(&self, type_name: &str) -> Result<Arc<Schema>> {
        self.schema_of(type_name, TypeCategory::Document)
    }

    pub fn embedded_schema(&self, type_name: &str) -> Result<Arc<Schema>> {
        self.schema_of(type_name, TypeCategory::Embedded)
    }

    fn schema_of(&self, type_name: &str, category: TypeCategory) -> Result<Arc<Schema>> {
        let schema = self.resolve(type_name)?;
        if schema.category != category {
            return Err(OdmError::TypeMismatch(format!(
                "'{}' is {:?}, expected {:?}",
                type_name, schema.category, category
            )));
        }
        Ok(schema)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    /// Registered type names in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn schemas(&self, category: TypeCategory) -> impl Iterator<Item = &Arc<Schema>> {
        self.order
            .iter()
            .filter_map(|name| self.schemas.get(name))
            .filter(move |schema| schema.category == category)
    }

    /// Direct subtypes.
    pub fn children(&self, type_name: &str) -> &[String] {
        self.children
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All registered subtypes, transitively, breadth first.
    pub fn subtypes(&self, type_name: &str) -> Vec<String> {
        let mut found: Vec<String> = self.children(type_name).to_vec();
        let mut idx = 0;
        while idx < found.len() {
            let next = self.children(&found[idx]).to_vec();
            found.extend(next);
            idx += 1;
        }
        found
    }

    /// Finds the registered type named by `discriminator` among `targets`
    /// and their subtypes. Empty `targets` means any type of `category`.
    pub fn resolve_discriminator(
        &self,
        targets: &[String],
        category: TypeCategory,
        discriminator: &str,
    ) -> Result<Arc<Schema>> {
        let unknown = || {
            if targets.is_empty() {
                OdmError::UnknownType(discriminator.to_string())
            } else {
                OdmError::UnknownType(format!(
                    "{} (not {} or a registered subtype)",
                    discriminator,
                    targets.join("|")
                ))
            }
        };

        let schema = self.schemas.get(discriminator).ok_or_else(|| unknown())?;
        if schema.category != category {
            return Err(unknown());
        }
        let admitted = targets.is_empty()
            || targets.iter().any(|target| {
                target == discriminator || self.subtypes(target).iter().any(|s| s == discriminator)
            });
        if admitted {
            Ok(schema.clone())
        } else {
            Err(unknown())
        }
    }

    /// Whether `type_name` is acceptable where `targets` are declared.
    pub fn admits(&self, targets: &[String], category: TypeCategory, type_name: &str) -> bool {
        match self.schemas.get(type_name) {
            Some(schema) if schema.category == category => {
                targets.is_empty() || targets.iter().any(|t| schema.is_a(t))
            }
            _ => false,
        }
    }

    /// Checks that every type named by a reference or embedded field is
    /// registered with the right category. Run once the registry is complete.
    pub fn verify(&self) -> Result<()> {
        for schema in self.schemas.values() {
            for field in &schema.fields {
                self.verify_kind(schema, field.name(), field.kind())?;
            }
        }
        Ok(())
    }

    fn verify_kind(&self, schema: &Schema, field: &str, kind: &FieldKind) -> Result<()> {
        let (targets, category) = match kind {
            FieldKind::Scalar(_) => return Ok(()),
            FieldKind::ListOf(element) => return self.verify_kind(schema, field, element),
            FieldKind::Reference(targets) => (targets, TypeCategory::Document),
            FieldKind::Embedded(types) => (types, TypeCategory::Embedded),
        };
        for target in targets {
            match self.schemas.get(target) {
                Some(found) if found.category == category => {}
                Some(found) => {
                    return Err(OdmError::Configuration(format!(
                        "field '{}.{}' targets '{}' which is {:?}, expected {:?}",
                        schema.type_name, field, target, found.category, category
                    )));
                }
                None => {
                    return Err(OdmError::Configuration(format!(
                        "field '{}.{}' targets unregistered type '{}'",
                        schema.type_name, field, target
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if !NAME_PATTERN.is_match(name) {
        return Err(OdmError::Configuration(format!(
            "invalid {} name '{}': use letters, digits and underscores",
            what, name
        )));
    }
    Ok(())
}

fn implicit_fields(decl: &TypeDecl) -> Vec<FieldDescriptor> {
    let mut fields = vec![
        FieldDescriptor::text(TYPE_FIELD)
            .default_value(decl.name.clone())
            .with_owner(&decl.name),
    ];
    if decl.category == TypeCategory::Document {
        fields.push(FieldDescriptor::scalar(ID_FIELD, [ScalarKind::Id]).with_owner(&decl.name));
    }
    fields
}

/// Folds the parent's field table with the declaration's own fields.
fn resolve(decl: &TypeDecl, parent: Option<&Schema>) -> Result<Schema> {
    let mut fields: Vec<Arc<FieldDescriptor>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for field in implicit_fields(decl) {
        positions.insert(field.name().to_string(), fields.len());
        fields.push(Arc::new(field));
    }
    if let Some(parent) = parent {
        for field in &parent.fields {
            if positions.contains_key(field.name()) {
                continue;
            }
            positions.insert(field.name().to_string(), fields.len());
            fields.push(field.clone());
        }
    }

    let mut seen = std::collections::HashSet::new();
    for field in &decl.fields {
        validate_name("field", field.name())?;
        if field.name() == TYPE_FIELD || field.name() == ID_FIELD {
            return Err(OdmError::Configuration(format!(
                "field '{}' on '{}' is reserved",
                field.name(),
                decl.name
            )));
        }
        if !seen.insert(field.name()) {
            return Err(OdmError::Configuration(format!(
                "field '{}' declared twice on '{}'",
                field.name(),
                decl.name
            )));
        }
        if let FieldDefault::Literal(value) = field.default()
            && !field.kind().admits_shape(value)
        {
            return Err(OdmError::Configuration(format!(
                "default {} of '{}.{}' does not fit {}",
                value,
                decl.name,
                field.name(),
                field.kind()
            )));
        }

        let owned = Arc::new(field.clone().with_owner(&decl.name));
        match positions.get(field.name()) {
            Some(&idx) => {
                let inherited = &fields[idx];
                if !field.kind().is_compatible_with(inherited.kind()) {
                    return Err(OdmError::Configuration(format!(
                        "'{}.{}' redefines {} field from '{}' as {}",
                        decl.name,
                        field.name(),
                        inherited.kind().family(),
                        inherited.declared_by().unwrap_or("?"),
                        field.kind().family()
                    )));
                }
                fields[idx] = owned;
            }
            None => {
                positions.insert(field.name().to_string(), fields.len());
                fields.push(owned);
            }
        }
    }

    let mut lineage = parent.map(|p| p.lineage.clone()).unwrap_or_default();
    lineage.push(decl.name.clone());

    let collection = match decl.category {
        TypeCategory::Embedded => None,
        TypeCategory::Document => Some(
            decl.collection
                .clone()
                .or_else(|| parent.and_then(|p| p.collection.clone()))
                .unwrap_or_else(|| CollectionOptions::named(decl.name.clone())),
        ),
    };
    if let Some(collection) = &collection {
        validate_name("collection", &collection.name)?;
    }

    let mut indexes = parent.map(|p| p.indexes.clone()).unwrap_or_default();
    for index in &decl.indexes {
        if index.keys.is_empty() {
            return Err(OdmError::Configuration(format!(
                "index on '{}' names no keys",
                decl.name
            )));
        }
        if let Some(key) = index.keys.iter().find(|k| !positions.contains_key(k.as_str())) {
            return Err(OdmError::Configuration(format!(
                "index on '{}' names unknown field '{}'",
                decl.name, key
            )));
        }
        indexes.push(index.clone());
    }

    Ok(Schema {
        type_name: decl.name.clone(),
        category: decl.category,
        lineage,
        fields,
        positions,
        collection,
        indexes,
    })
}
