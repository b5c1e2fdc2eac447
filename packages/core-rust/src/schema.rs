//! Runtime schema model.
//!
//! Every domain type that crosses the dispatch boundary describes its own
//! shape through [`Describe`], producing a [`TypeDescriptor`] tree. The tree is
//! built fresh on every call and is a pure function of the type, never of a
//! particular value.
//!
//! Structs usually get their impl from [`describe_struct!`], which also
//! carries per-field annotations in the `key:value;key:value` grammar:
//!
//! ```
//! use opkit_core::{describe_struct, Describe, Kind};
//!
//! describe_struct! {
//!     #[derive(Debug, Clone)]
//!     pub struct SaveUserInput {
//!         pub name: String,
//!         pub authority: String => "enum:admin,user",
//!         pub nickname: Option<String> => "optional:true",
//!     }
//! }
//!
//! let schema = SaveUserInput::describe();
//! assert_eq!(schema.kind, Kind::Object);
//! assert_eq!(schema.fields[1].enum_values, vec!["admin", "user"]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Classification of a described shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Object,
    Array,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    /// Timestamp scalar. Structurally a record, but has no user-relevant sub-fields.
    Time,
}

impl Kind {
    /// Returns `true` for every kind except `Object` and `Array`.
    #[must_use]
    pub fn is_scalar(self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Lowercase wire name, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Int => "int",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint => "uint",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Time => "time",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TypeDescriptor
// ---------------------------------------------------------------------------

/// Describes one shape: its kind, identity, and children.
///
/// `fields` is populated for `Object` only, `element` for `Array` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TypeDescriptor {
    pub kind: Kind,
    /// Full module path of the type, empty for built-in scalars.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Rendered type name, including any wrapper markers (`?`, `*`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    /// Creates a scalar descriptor with no namespace.
    #[must_use]
    pub fn scalar(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: String::new(),
            name: name.into(),
            fields: Vec::new(),
            element: None,
        }
    }

    /// Creates an empty object descriptor for a type declared in `namespace`.
    ///
    /// The rendered name is `<last namespace segment>::<ident>`.
    #[must_use]
    pub fn object(namespace: &str, ident: &str) -> Self {
        let name = match namespace.rsplit("::").next() {
            Some(last) if !last.is_empty() => format!("{last}::{ident}"),
            _ => ident.to_string(),
        };
        Self {
            kind: Kind::Object,
            namespace: namespace.to_string(),
            name,
            fields: Vec::new(),
            element: None,
        }
    }

    /// Creates an array descriptor over a single element shape.
    #[must_use]
    pub fn array(element: TypeDescriptor) -> Self {
        Self {
            kind: Kind::Array,
            namespace: String::new(),
            name: format!("[{}]", element.name),
            fields: Vec::new(),
            element: Some(Box::new(element)),
        }
    }

    /// Appends a field, binding its back-reference to this type.
    #[must_use]
    pub fn field(mut self, mut field: FieldDescriptor) -> Self {
        field.parent = Some(self.name.clone());
        self.fields.push(field);
        self
    }

    /// Appends a field only when `visible` is true.
    #[must_use]
    pub fn field_if(self, visible: bool, field: FieldDescriptor) -> Self {
        if visible {
            self.field(field)
        } else {
            self
        }
    }

    /// Prefixes the rendered name with a wrapper marker. Kind is unaffected.
    #[must_use]
    pub fn wrapped(mut self, marker: &str) -> Self {
        self.name = format!("{marker}{}", self.name);
        self
    }

    /// Looks up a declared field by name.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// One declared field of an object shape, with its validation annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "Type")]
    pub ty: TypeDescriptor,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    /// Allowed literal values. Only meaningful on scalar fields.
    #[serde(rename = "Enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    /// Names of custom validators that apply to this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<String>,
    #[serde(skip)]
    parent: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            enum_values: Vec::new(),
            min: None,
            max: None,
            custom: Vec::new(),
            parent: None,
        }
    }

    /// Applies an annotation string (`optional:true;enum:a,b;min:1`).
    #[must_use]
    pub fn annotate(self, annotation: &str) -> Self {
        self.with_annotations(parse_annotations(annotation))
    }

    /// Applies already-parsed annotations. Keys absent from `ann` keep their current value.
    #[must_use]
    pub fn with_annotations(mut self, ann: Annotations) -> Self {
        if let Some(optional) = ann.optional {
            self.optional = optional;
        }
        if let Some(values) = ann.enum_values {
            self.enum_values = values;
        }
        if ann.min.is_some() {
            self.min = ann.min;
        }
        if ann.max.is_some() {
            self.max = ann.max;
        }
        if let Some(custom) = ann.custom {
            self.custom = custom;
        }
        self
    }

    /// Rendered name of the owning type, if this field was attached to one.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether `name` appears in this field's `custom` list.
    #[must_use]
    pub fn has_custom(&self, name: &str) -> bool {
        self.custom.iter().any(|c| c == name)
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// Parsed form of a field annotation string. `None` means the key was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub optional: Option<bool>,
    pub enum_values: Option<Vec<String>>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub custom: Option<Vec<String>>,
}

/// Parses a semicolon-separated `key:value` annotation string.
///
/// Recognized keys are `optional`, `enum`, `min`, `max`, and `custom`.
/// Unknown keys and segments without a `:` are ignored. A `min`/`max`
/// value that is not an integer is dropped with a warning.
#[must_use]
pub fn parse_annotations(annotation: &str) -> Annotations {
    let mut ann = Annotations::default();
    for part in annotation.split(';') {
        let Some((key, value)) = part.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "optional" => ann.optional = Some(value == "true"),
            "enum" => ann.enum_values = Some(split_list(value)),
            "custom" => ann.custom = Some(split_list(value)),
            bound @ ("min" | "max") => {
                if value.is_empty() {
                    continue;
                }
                match value.parse::<i64>() {
                    Ok(n) if bound == "min" => ann.min = Some(n),
                    Ok(n) => ann.max = Some(n),
                    Err(e) => {
                        tracing::warn!(key = bound, value, error = %e, "ignoring malformed bound annotation");
                    }
                }
            }
            _ => {}
        }
    }
    ann
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Describe
// ---------------------------------------------------------------------------

/// A type that can produce its runtime schema.
pub trait Describe {
    fn describe() -> TypeDescriptor;
}

/// Describes a type.
#[must_use]
pub fn describe<T: Describe + ?Sized>() -> TypeDescriptor {
    T::describe()
}

/// Describes the static type of a value. The value's data is not inspected.
#[must_use]
pub fn describe_value<T: Describe + ?Sized>(_value: &T) -> TypeDescriptor {
    T::describe()
}

#[doc(hidden)]
#[must_use]
pub fn __is_visible(vis: &str) -> bool {
    vis.starts_with("pub") && vis != "pub(self)"
}

macro_rules! describe_scalars {
    ($($ty:ty => $kind:ident, $name:literal;)*) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescriptor {
                    TypeDescriptor::scalar(Kind::$kind, $name)
                }
            }
        )*
    };
}

describe_scalars! {
    String => String, "String";
    str => String, "str";
    bool => Bool, "bool";
    isize => Int, "isize";
    i8 => Int8, "i8";
    i16 => Int16, "i16";
    i32 => Int32, "i32";
    i64 => Int64, "i64";
    usize => Uint, "usize";
    u8 => Uint8, "u8";
    u16 => Uint16, "u16";
    u32 => Uint32, "u32";
    u64 => Uint64, "u64";
    f32 => Float32, "f32";
    f64 => Float64, "f64";
}

impl Describe for DateTime<Utc> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor {
            kind: Kind::Time,
            namespace: "chrono".to_string(),
            name: "chrono::DateTime".to_string(),
            fields: Vec::new(),
            element: None,
        }
    }
}

/// The unit type describes as an empty object, for operations without payload.
impl Describe for () {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::object("", "()")
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescriptor {
        T::describe().wrapped("?")
    }
}

impl<T: Describe + ?Sized> Describe for Box<T> {
    fn describe() -> TypeDescriptor {
        T::describe().wrapped("*")
    }
}

impl<T: Describe + ?Sized> Describe for Arc<T> {
    fn describe() -> TypeDescriptor {
        T::describe().wrapped("*")
    }
}

impl<T: Describe + ?Sized> Describe for Rc<T> {
    fn describe() -> TypeDescriptor {
        T::describe().wrapped("*")
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::array(T::describe())
    }
}

impl<T: Describe> Describe for VecDeque<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::array(T::describe())
    }
}

impl<T: Describe> Describe for [T] {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::array(T::describe())
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::array(T::describe())
    }
}

/// Declares a struct together with its [`Describe`] impl.
///
/// Each field may be followed by `=> "annotation"`. Field names must match the
/// serialized names, so avoid `#[serde(rename)]` on described fields. Fields
/// without a `pub` visibility are left out of the schema.
#[macro_export]
macro_rules! describe_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty $(=> $ann:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::schema::Describe for $name {
            fn describe() -> $crate::schema::TypeDescriptor {
                $crate::schema::TypeDescriptor::object(module_path!(), stringify!($name))
                $(
                    .field_if(
                        $crate::schema::__is_visible(stringify!($fvis)),
                        $crate::schema::FieldDescriptor::new(
                            stringify!($field),
                            <$ty as $crate::schema::Describe>::describe(),
                        )
                        $(.annotate($ann))?,
                    )
                )*
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    crate::describe_struct! {
        #[derive(Debug, Clone, Default)]
        pub struct Group {
            pub id: String,
            pub created_at: Option<DateTime<Utc>>,
        }
    }

    crate::describe_struct! {
        #[derive(Debug, Clone, Default)]
        pub struct User {
            pub name: String,
            pub authority: String => "enum:admin, user",
            pub age: u8 => "min:0;max:150",
            pub groups: Vec<Group> => "optional:true",
            pub matrix: Vec<Vec<f64>> => "optional:true",
            secret: String,
        }
    }

    #[test]
    fn object_fields_in_declaration_order() {
        let schema = User::describe();
        assert_eq!(schema.kind, Kind::Object);
        assert_eq!(schema.name, "tests::User");
        assert!(schema.namespace.ends_with("schema::tests"));
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "authority", "age", "groups", "matrix"]);
    }

    #[test]
    fn private_fields_are_skipped() {
        let user = User::default();
        assert!(user.secret.is_empty());
        assert!(User::describe().field_named("secret").is_none());
    }

    #[test]
    fn annotations_are_applied() {
        let schema = User::describe();
        let authority = schema.field_named("authority").unwrap();
        assert_eq!(authority.enum_values, vec!["admin", "user"]);
        assert!(!authority.optional);

        let age = schema.field_named("age").unwrap();
        assert_eq!(age.min, Some(0));
        assert_eq!(age.max, Some(150));
        assert_eq!(age.ty.kind, Kind::Uint8);
    }

    #[test]
    fn fields_reference_their_owner() {
        let schema = User::describe();
        assert_eq!(schema.fields[0].parent(), Some("tests::User"));
    }

    #[test]
    fn arrays_recurse_into_element() {
        let schema = User::describe();
        let groups = &schema.field_named("groups").unwrap().ty;
        assert_eq!(groups.kind, Kind::Array);
        assert_eq!(groups.name, "[tests::Group]");
        let element = groups.element.as_deref().unwrap();
        assert_eq!(element.kind, Kind::Object);
        assert_eq!(element.fields.len(), 2);

        let matrix = &schema.field_named("matrix").unwrap().ty;
        let inner = matrix.element.as_deref().unwrap();
        assert_eq!(inner.kind, Kind::Array);
        assert_eq!(inner.element.as_deref().unwrap().kind, Kind::Float64);
    }

    #[test]
    fn wrappers_keep_kind_but_mark_name() {
        let opt = describe::<Option<DateTime<Utc>>>();
        assert_eq!(opt.kind, Kind::Time);
        assert_eq!(opt.name, "?chrono::DateTime");

        let boxed = describe::<Box<i32>>();
        assert_eq!(boxed.kind, Kind::Int32);
        assert_eq!(boxed.name, "*i32");
    }

    #[test]
    fn time_is_its_own_kind() {
        let schema = Group::describe();
        let created = &schema.field_named("created_at").unwrap().ty;
        assert_eq!(created.kind, Kind::Time);
        assert!(created.fields.is_empty());
    }

    #[test]
    fn describe_value_ignores_data() {
        assert_eq!(describe_value(&User::default()), User::describe());
        assert_eq!(describe_value(&vec![1_i64, 2]), describe::<Vec<i64>>());
    }

    #[test]
    fn descriptor_serializes_pascal_case() {
        let json = serde_json::to_value(Group::describe()).unwrap();
        assert_eq!(json["Kind"], "object");
        assert_eq!(json["Fields"][0]["Name"], "id");
        assert_eq!(json["Fields"][0]["Type"]["Kind"], "string");
        assert!(json["Fields"][0].get("Optional").is_none());
        assert!(json.get("Element").is_none());
    }

    #[test]
    fn parse_full_annotation() {
        let ann = parse_annotations("optional:true; enum:a,b ,c; min:-3; max:10; custom:email, slug");
        assert_eq!(ann.optional, Some(true));
        assert_eq!(ann.enum_values, Some(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(ann.min, Some(-3));
        assert_eq!(ann.max, Some(10));
        assert_eq!(ann.custom, Some(vec!["email".into(), "slug".into()]));
    }

    #[test]
    fn malformed_bounds_are_dropped() {
        let ann = parse_annotations("min:abc;max:");
        assert_eq!(ann.min, None);
        assert_eq!(ann.max, None);
    }

    proptest! {
        #[test]
        fn unknown_keys_are_ignored(key in "[a-z]{3,10}", value in "[a-z0-9]{0,8}") {
            prop_assume!(!matches!(key.as_str(), "optional" | "enum" | "min" | "max" | "custom"));
            let ann = parse_annotations(&format!("{key}:{value};optional:true"));
            prop_assert_eq!(ann, Annotations { optional: Some(true), ..Annotations::default() });
        }

        #[test]
        fn integer_bounds_roundtrip(min in any::<i64>(), max in any::<i64>()) {
            let ann = parse_annotations(&format!("min:{min};max:{max}"));
            prop_assert_eq!(ann.min, Some(min));
            prop_assert_eq!(ann.max, Some(max));
        }
    }
}
