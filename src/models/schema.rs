//! Declarative message schemas and their structural validator.
//!
//! A [`Schema`] lists the fields a JSON-encoded log message must carry and
//! the JSON type of each one. It can be declared inline
//! (`"field1: string, field2: integer"`), read from a JSON Schema document,
//! or derived from any type implementing `schemars::JsonSchema`.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::SchemaError;

/// JSON type a field is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    /// Whether `value` has this kind. `integer` only accepts integral numbers
    /// and no kind accepts `null`; see [`FieldSpec::nullable`].
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => !value.is_null(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }

    fn from_json_type(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldKind::String),
            "integer" => Some(FieldKind::Integer),
            "number" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "array" => Some(FieldKind::Array),
            "object" => Some(FieldKind::Object),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" => Ok(FieldKind::String),
            "integer" | "int" => Ok(FieldKind::Integer),
            "number" | "float" => Ok(FieldKind::Number),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "array" | "list" => Ok(FieldKind::Array),
            "object" | "dict" => Ok(FieldKind::Object),
            "any" => Ok(FieldKind::Any),
            _ => Err(()),
        }
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// `null` is accepted in place of a value of `kind`.
    pub nullable: bool,
    /// Fields an `object` value must carry in turn.
    pub nested: Option<Schema>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            nullable: false,
            nested: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            nullable: true,
            nested: None,
        }
    }

    /// An `object` field whose value must itself match `schema`.
    pub fn with_nested(mut self, schema: Schema) -> Self {
        self.kind = FieldKind::Object;
        self.nested = Some(schema);
        self
    }
}

/// One reason a value failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' should be {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
}

impl ValidationError {
    fn within(self, parent: &str) -> Self {
        match self {
            ValidationError::MissingField(field) => {
                ValidationError::MissingField(format!("{}.{}", parent, field))
            }
            ValidationError::TypeMismatch {
                field,
                expected,
                found,
            } => ValidationError::TypeMismatch {
                field: format!("{}.{}", parent, field),
                expected,
                found,
            },
            ValidationError::NotAnObject(found) => ValidationError::TypeMismatch {
                field: parent.to_string(),
                expected: FieldKind::Object,
                found,
            },
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An immutable set of field declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Builds a schema from explicit field specs.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        for (i, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyField(i));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Derives a schema from a Rust type, the way a model class declares
    /// the shape of a message.
    pub fn for_type<T: JsonSchema>() -> Result<Self, SchemaError> {
        let root = schemars::schema_for!(T);
        let document = serde_json::to_value(&root)
            .map_err(|e| SchemaError::NotAnObjectSchema(e.to_string()))?;
        Self::from_json_schema(&document)
    }

    /// Reads the `properties` and `required` of a JSON Schema object.
    /// `$ref`s into `definitions` (or `$defs`) are resolved, so nested
    /// objects are validated too. A property with no type information
    /// accepts any value, and `null` only when the property is optional.
    pub fn from_json_schema(document: &Value) -> Result<Self, SchemaError> {
        let definitions = document
            .get("definitions")
            .or_else(|| document.get("$defs"))
            .and_then(Value::as_object);
        object_schema(document, definitions, 0)
    }

    /// Builds a schema from `(name, type)` pairs using the same syntax as an
    /// inline declaration, e.g. `("note?", "string")`.
    pub fn from_declarations<I, N, K>(declarations: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (N, K)>,
        N: AsRef<str>,
        K: AsRef<str>,
    {
        let fields = declarations
            .into_iter()
            .enumerate()
            .map(|(i, (name, kind))| field_spec(i, name.as_ref(), kind.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks `value` against the declared fields, collecting every failure.
    /// Keys the schema does not declare are ignored.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<ValidationError>> {
        let object = match value {
            Value::Object(object) => object,
            other => return Err(vec![ValidationError::NotAnObject(json_type_name(other))]),
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => {
                    errors.push(ValidationError::MissingField(field.name.clone()))
                }
                None => {}
                Some(Value::Null) if field.nullable => {}
                Some(v) if field.kind.matches(v) => {
                    if let Some(nested) = &field.nested {
                        if let Err(inner) = nested.validate(v) {
                            errors.extend(inner.into_iter().map(|e| e.within(&field.name)));
                        }
                    }
                }
                Some(v) => errors.push(ValidationError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.kind,
                    found: json_type_name(v),
                }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Pass/fail shorthand for [`Schema::validate`].
    pub fn accepts(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }
}

/// Nesting deeper than this is checked as a plain `object`, which also stops
/// self-referencing types from recursing forever.
const MAX_NESTING: usize = 16;

fn object_schema(
    root: &Value,
    definitions: Option<&Map<String, Value>>,
    depth: usize,
) -> Result<Schema, SchemaError> {
    let root = root
        .as_object()
        .ok_or_else(|| SchemaError::NotAnObjectSchema(json_type_name(root).to_string()))?;

    if let Some(kind) = root.get("type") {
        if kind != "object" {
            return Err(SchemaError::NotAnObjectSchema(kind.to_string()));
        }
    }

    let empty = Map::new();
    let properties = match root.get("properties") {
        Some(Value::Object(properties)) => properties,
        Some(other) => {
            return Err(SchemaError::NotAnObjectSchema(format!(
                "'properties' is {}",
                json_type_name(other)
            )))
        }
        None => &empty,
    };
    let required: Vec<&str> = root
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let fields = properties
        .iter()
        .map(|(name, property)| {
            let shape = property_shape(property, definitions, depth)?;
            let is_required = required.contains(&name.as_str());
            Ok(FieldSpec {
                name: name.clone(),
                kind: shape.kind,
                required: is_required,
                // Untyped optional properties may be null; untyped required ones may not.
                nullable: shape.nullable || (shape.kind == FieldKind::Any && !is_required),
                nested: shape.nested,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;
    Schema::new(fields)
}

struct PropertyShape {
    kind: FieldKind,
    nullable: bool,
    nested: Option<Schema>,
}

impl PropertyShape {
    fn of(kind: FieldKind, nullable: bool) -> Self {
        Self {
            kind,
            nullable,
            nested: None,
        }
    }
}

fn resolve_ref<'a>(
    reference: &str,
    definitions: Option<&'a Map<String, Value>>,
) -> Option<&'a Value> {
    let name = reference
        .strip_prefix("#/definitions/")
        .or_else(|| reference.strip_prefix("#/$defs/"))?;
    definitions?.get(name)
}

/// Resolves a property's kind from its `type` (a single name or a list such
/// as `["string", "null"]`), following `$ref`, single-entry `allOf` and
/// `anyOf`/`oneOf` unions with `null`.
fn property_shape(
    property: &Value,
    definitions: Option<&Map<String, Value>>,
    depth: usize,
) -> Result<PropertyShape, SchemaError> {
    if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
        return match resolve_ref(reference, definitions) {
            Some(target) if depth < MAX_NESTING => property_shape(target, definitions, depth + 1),
            Some(_) => Ok(PropertyShape::of(FieldKind::Object, false)),
            None => Err(SchemaError::UnresolvedReference(reference.to_string())),
        };
    }

    if let Some(Value::Array(parts)) = property.get("allOf") {
        if let [single] = parts.as_slice() {
            return property_shape(single, definitions, depth);
        }
    }

    if let Some(Value::Array(variants)) = property.get("anyOf").or_else(|| property.get("oneOf")) {
        let is_null = |v: &&Value| v.get("type").and_then(Value::as_str) == Some("null");
        let nullable = variants.iter().any(|v| is_null(&v));
        let others: Vec<&Value> = variants.iter().filter(|v| !is_null(v)).collect();
        return match others.as_slice() {
            [single] => {
                let mut shape = property_shape(single, definitions, depth)?;
                shape.nullable |= nullable;
                Ok(shape)
            }
            _ => Ok(PropertyShape::of(FieldKind::Any, nullable)),
        };
    }

    let shape = match property.get("type") {
        Some(Value::String(name)) => match FieldKind::from_json_type(name) {
            Some(kind) => PropertyShape::of(kind, false),
            None => PropertyShape::of(FieldKind::Any, name == "null"),
        },
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let kinds: Vec<FieldKind> = names
                .iter()
                .filter_map(|n| FieldKind::from_json_type(n))
                .collect();
            match kinds.as_slice() {
                [kind] => PropertyShape::of(*kind, nullable),
                _ => PropertyShape::of(FieldKind::Any, nullable),
            }
        }
        _ => PropertyShape::of(FieldKind::Any, false),
    };

    if shape.kind == FieldKind::Object && property.get("properties").is_some() {
        let nested = object_schema(property, definitions, depth + 1)?;
        return Ok(PropertyShape {
            nested: Some(nested),
            ..shape
        });
    }
    Ok(shape)
}

impl FromStr for Schema {
    type Err = SchemaError;

    /// Parses `"name: type, other?: type"`. A `?` after the name marks the
    /// field optional (absent or `null`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }

        let fields = s
            .split([',', ';', '\n'])
            .enumerate()
            .filter(|(_, decl)| !decl.trim().is_empty())
            .map(|(i, decl)| parse_field(i, decl.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }
}

fn parse_field(position: usize, decl: &str) -> Result<FieldSpec, SchemaError> {
    if decl.is_empty() {
        return Err(SchemaError::EmptyField(position));
    }
    let (name, kind) = decl
        .split_once(':')
        .ok_or_else(|| SchemaError::MissingSeparator(decl.to_string()))?;
    field_spec(position, name, kind)
}

fn field_spec(position: usize, name: &str, kind: &str) -> Result<FieldSpec, SchemaError> {
    let name = name.trim();
    let (name, optional) = match name.strip_suffix('?') {
        Some(stripped) => (stripped.trim(), true),
        None => (name, false),
    };
    if name.is_empty() {
        return Err(SchemaError::EmptyField(position));
    }

    let kind = kind
        .parse::<FieldKind>()
        .map_err(|_| SchemaError::UnknownKind {
            field: name.to_string(),
            kind: kind.trim().to_string(),
        })?;

    Ok(if optional {
        FieldSpec::optional(name, kind)
    } else {
        FieldSpec::required(name, kind)
    })
}
