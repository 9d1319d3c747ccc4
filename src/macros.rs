//! Declarative helpers over the dynamic document API.

/// Field list for [`crate::Mapper::create`] and friends.
///
/// ```
/// use memodoc::prelude::*;
/// # use std::sync::Arc;
/// # fn main() -> memodoc::Result<()> {
/// # let registry = SchemaRegistry::new().with_type(
/// #     TypeDecl::document("User")
/// #         .field(Field::text("name"))
/// #         .field(Field::integer("age")),
/// # )?;
/// # let mapper = Mapper::open(registry, Arc::new(InMemoryGateway::default()))?;
/// let user = mapper.create("User", fields! { "name" => "Frank", "age" => 40 })?;
/// assert_eq!(user.value_as::<i64>("age")?, Some(40));
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        ::std::vec::Vec::<(&str, $crate::FieldInput)>::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$(($name, $crate::FieldInput::from($value))),+]
    };
}

/// Typed wrapper over a registered document type.
///
/// Generates a newtype over [`crate::Document`] with a checked `wrap`,
/// `create`/`get`/`find_one` constructors, a getter per listed field and a
/// `set_<field>` setter. The type must be registered under the struct's name.
///
/// ```
/// use memodoc::prelude::*;
/// # use std::sync::Arc;
///
/// typed_document! {
///     pub struct User {
///         name: String,
///         last_name: String,
///     }
/// }
///
/// # fn main() -> memodoc::Result<()> {
/// # let registry = SchemaRegistry::new().with_type(
/// #     TypeDecl::document("User")
/// #         .field(Field::text("name"))
/// #         .field(Field::text("last_name")),
/// # )?;
/// # let mapper = Mapper::open(registry, Arc::new(InMemoryGateway::default()))?;
/// let frank = User::create(&mapper, fields! { "name" => "Frank" })?;
/// frank.set_last_name("Footer")?;
/// assert_eq!(frank.name()?, Some("Frank".to_string()));
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! typed_document {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field:ident : $field_ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name($crate::Document);

        impl $name {
            pub const TYPE_NAME: &'static str = stringify!($name);

            /// Wraps a document of this type or one of its subtypes.
            pub fn wrap(document: $crate::Document) -> $crate::Result<Self> {
                if $crate::FieldAccess::schema(&document).is_a(Self::TYPE_NAME) {
                    Ok(Self(document))
                } else {
                    Err($crate::OdmError::TypeMismatch(format!(
                        "'{}' is not a {}",
                        $crate::FieldAccess::type_name(&document),
                        Self::TYPE_NAME
                    )))
                }
            }

            pub fn create<I, K, V>(mapper: &$crate::Mapper, fields: I) -> $crate::Result<Self>
            where
                I: IntoIterator<Item = (K, V)>,
                K: AsRef<str>,
                V: Into<$crate::FieldInput>,
            {
                mapper.create(Self::TYPE_NAME, fields).map(Self)
            }

            pub fn get(mapper: &$crate::Mapper, id: &$crate::DocumentId) -> $crate::Result<Self> {
                Self::wrap(mapper.get(Self::TYPE_NAME, id)?)
            }

            pub fn find_one(mapper: &$crate::Mapper, filter: &$crate::Filter) -> $crate::Result<Self> {
                Self::wrap(mapper.find_one(Self::TYPE_NAME, filter)?)
            }

            pub fn document(&self) -> &$crate::Document {
                &self.0
            }

            pub fn into_document(self) -> $crate::Document {
                self.0
            }

            $crate::paste::paste! {
                $(
                    pub fn $field(&self) -> $crate::Result<Option<$field_ty>> {
                        $crate::FieldAccess::value_as(&self.0, stringify!($field))
                    }

                    pub fn [<set_ $field>](
                        &self,
                        value: impl Into<$crate::FieldInput>,
                    ) -> $crate::Result<()> {
                        $crate::FieldAccess::set(&self.0, stringify!($field), value)
                    }
                )*
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::Document;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$name> for $crate::FieldInput {
            fn from(typed: $name) -> Self {
                $crate::FieldInput::Document(typed.0)
            }
        }
    };
}
