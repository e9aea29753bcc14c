//! The in-memory model of a single JSON Schema node.
//!
//! Nodes live in a [`Context`](crate::Context) arena and point at their
//! children and parent by [`SchemaId`]. Keywords the resolver does not
//! interpret are carried as typed fields or opaque JSON values and passed
//! through unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use url::Url;

use crate::error::ResolveError;
use crate::loader::without_empty_fragment;
use crate::markdown::pascalize;

/// Handle to a schema node owned by a [`Context`](crate::Context).
///
/// Only meaningful for the context that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) usize);

/// The seven JSON Schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Array,
    Boolean,
    Integer,
    Null,
    Number,
    Object,
    String,
}

impl Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            Type::Array => "array",
            Type::Boolean => "boolean",
            Type::Integer => "integer",
            Type::Null => "null",
            Type::Number => "number",
            Type::Object => "object",
            Type::String => "string",
        }
    }

    /// Parse a type name. Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "array" => Some(Type::Array),
            "boolean" => Some(Type::Boolean),
            "integer" => Some(Type::Integer),
            "null" => Some(Type::Null),
            "number" => Some(Type::Number),
            "object" => Some(Type::Object),
            "string" => Some(Type::String),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse the `type` keyword, which may be a single name or a list of names.
pub fn parse_types(value: &Value) -> Result<Vec<Type>, String> {
    let parse_one = |v: &Value| match v {
        Value::String(s) => Type::parse(s).ok_or_else(|| format!("unknown type \"{}\"", s)),
        other => Err(format!(
            "unsupported type: {} for {}",
            json_type_name(other),
            other
        )),
    };

    match value {
        Value::String(_) => Ok(vec![parse_one(value)?]),
        Value::Array(list) => list.iter().map(parse_one).collect(),
        other => Err(format!(
            "unsupported type: {} for {}",
            json_type_name(other),
            other
        )),
    }
}

fn deserialize_types<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Type>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_types(&value).map_err(serde::de::Error::custom)
}

fn serialize_types<S: Serializer>(types: &[Type], serializer: S) -> Result<S::Ok, S::Error> {
    match types {
        [single] => single.serialize(serializer),
        many => many.serialize(serializer),
    }
}

/// Named sub-schemas in document order (`properties`, `definitions`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Members {
    entries: Vec<(String, SchemaId)>,
}

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<SchemaId> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, id)| *id)
    }

    /// Insert or replace `name`, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, id: SchemaId) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = id,
            None => self.entries.push((name, id)),
        }
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SchemaId)> + '_ {
        self.entries.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }

    pub(crate) fn ids_mut(&mut self) -> impl Iterator<Item = &mut SchemaId> + '_ {
        self.entries.iter_mut().map(|(_, id)| id)
    }
}

impl FromIterator<(String, SchemaId)> for Members {
    fn from_iter<I: IntoIterator<Item = (String, SchemaId)>>(iter: I) -> Self {
        let mut members = Members::new();
        for (name, id) in iter {
            members.insert(name, id);
        }
        members
    }
}

/// A JSON Schema node.
///
/// Scalar keywords are (de)serialized with serde; keywords holding
/// sub-schemas are filled in by the [`Context`](crate::Context) parser and
/// refer to other arena nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(rename = "$id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "$comment", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_description: Option<String>,
    #[serde(
        rename = "type",
        deserialize_with = "deserialize_types",
        serialize_with = "serialize_types",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub types: Vec<Type>,

    #[serde(skip)]
    pub properties: Members,
    #[serde(skip)]
    pub pattern_properties: Members,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Value>,
    #[serde(skip)]
    pub property_names: Option<SchemaId>,
    #[serde(skip)]
    pub definitions: Members,
    #[serde(skip)]
    pub items: Option<SchemaId>,
    #[serde(skip)]
    pub prefix_items: Vec<SchemaId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_items: Option<Value>,
    #[serde(skip)]
    pub contains: Option<SchemaId>,
    #[serde(skip)]
    pub all_of: Vec<SchemaId>,
    #[serde(skip)]
    pub any_of: Vec<SchemaId>,
    #[serde(skip)]
    pub one_of: Vec<SchemaId>,
    #[serde(skip)]
    pub not: Vec<SchemaId>,
    #[serde(skip)]
    pub if_schema: Option<SchemaId>,
    #[serde(skip)]
    pub then_schema: Option<SchemaId>,
    #[serde(skip)]
    pub else_schema: Option<SchemaId>,

    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_descriptions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// A number in current drafts, a boolean in draft-04.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_contains: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_contains: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unevaluated_properties: Option<Value>,

    /// Property/definition name or pointer basename this node was reached under.
    #[serde(skip)]
    pub key: Option<String>,
    /// URI the root document was fetched from. Only set on roots.
    #[serde(skip)]
    pub retrieval_uri: Option<String>,

    #[serde(skip)]
    pub(crate) parent: Option<SchemaId>,
    #[serde(skip)]
    pub(crate) resolved: bool,
    #[serde(skip)]
    pub(crate) document: Value,
}

impl Schema {
    /// Attach the raw document this node mirrors.
    pub fn with_document(mut self, document: Value) -> Self {
        self.document = document;
        self
    }

    /// The raw JSON this node was parsed from.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn parent(&self) -> Option<SchemaId> {
        self.parent
    }

    /// True once `$ref` dereferencing has been applied to this node.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Base URI of a root schema: `$id` resolved against the retrieval URI.
    ///
    /// Call this on a root; [`Context::base_uri`](crate::Context::base_uri)
    /// finds the root for any node. `None` when the node has neither a
    /// retrieval URI nor an `$id`, as for documents built with
    /// [`Context::parse_document`](crate::Context::parse_document).
    ///
    /// # Panics
    ///
    /// Panics if the retrieval URI or `$id` is malformed. Both are fixed
    /// when a document is loaded, so this indicates broken input rather than
    /// a recoverable condition.
    pub fn base_uri(&self) -> Option<Url> {
        let retrieval = self.retrieval_uri.as_deref().map(|uri| {
            Url::parse(uri)
                .unwrap_or_else(|e| panic!("malformed retrieval URI \"{}\": {}", uri, e))
        });

        let base = match (retrieval, self.id.as_deref()) {
            (Some(retrieval), None) => retrieval,
            (Some(retrieval), Some(id)) => retrieval
                .join(id)
                .unwrap_or_else(|e| panic!("malformed $id \"{}\": {}", id, e)),
            (None, Some(id)) => {
                Url::parse(id).unwrap_or_else(|e| panic!("malformed $id \"{}\": {}", id, e))
            }
            (None, None) => return None,
        };
        Some(without_empty_fragment(base))
    }

    /// Resolve `reference` against [`base_uri`](Self::base_uri).
    ///
    /// Fails with [`ResolveError::InvalidReference`] when there is no base
    /// URI or the reference cannot be joined to it.
    pub fn ref_uri(&self, reference: &str) -> Result<Url, ResolveError> {
        let invalid = |message: String| ResolveError::InvalidReference {
            reference: reference.to_string(),
            message,
        };
        let base = self.base_uri().ok_or_else(|| {
            invalid("document has neither a retrieval URI nor an $id to resolve against".to_string())
        })?;
        base.join(reference)
            .map(without_empty_fragment)
            .map_err(|e| invalid(e.to_string()))
    }

    /// Name used for headings and links.
    ///
    /// Prefers `title`, then `key`, then the last segment of `$ref`, all
    /// Pascal-cased. Empty when none are present.
    pub fn entity_name(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return pascalize(title);
        }
        if let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) {
            return pascalize(key);
        }
        if let Some(reference) = self.reference.as_deref().filter(|r| !r.is_empty()) {
            let base = reference.rsplit('/').next().unwrap_or(reference);
            return pascalize(base);
        }
        String::new()
    }

    /// Description as Markdown, preferring `markdownDescription`.
    pub fn description_markdown(&self) -> &str {
        self.markdown_description
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.description.as_deref())
            .unwrap_or("")
    }

    /// True when `key` is listed in `required`.
    pub fn required_key(&self, key: &str) -> bool {
        self.required.iter().any(|k| k == key)
    }

    /// Allowed values as Markdown list items (without the bullet).
    ///
    /// A `const` takes precedence over `enum`. Values are JSON-encoded in
    /// backticks; the matching `enumDescriptions` entry follows after `: `.
    pub fn enum_markdown_items(&self) -> Vec<String> {
        if let Some(value) = &self.const_value {
            return vec![format!("`{}`", value)];
        }

        self.enum_values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let mut item = format!("`{}`", value);
                if let Some(desc) = self.enum_descriptions.get(idx).filter(|d| !d.is_empty()) {
                    item.push_str(": ");
                    item.push_str(desc);
                }
                item
            })
            .collect()
    }

    /// Allowed values as a bulleted Markdown list. Empty when there are none.
    pub fn enum_markdown(&self) -> String {
        self.enum_markdown_items()
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Each example rendered as YAML, nested under `key` when it is set.
    pub fn yaml_examples(&self) -> Vec<String> {
        self.examples
            .iter()
            .map(|example| {
                let rendered = match self.key.as_deref().filter(|k| !k.is_empty()) {
                    Some(key) => {
                        let mut wrapped = serde_json::Map::new();
                        wrapped.insert(key.to_string(), example.clone());
                        serde_yaml::to_string(&Value::Object(wrapped))
                    }
                    None => serde_yaml::to_string(example),
                };
                match rendered {
                    Ok(yaml) => yaml.trim().to_string(),
                    Err(e) => e.to_string(),
                }
            })
            .collect()
    }

    /// Examples as fenced YAML blocks. Empty when there are none.
    pub fn examples_markdown(&self) -> String {
        self.yaml_examples()
            .iter()
            .map(|yaml| format!("```yaml\n{}\n```", yaml))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Overwrite every keyword that is present in `other`'s raw document.
    ///
    /// Presence is decided by the document, not by the typed value, so an
    /// explicit `false`, `""` or `[]` still overrides. Unknown keys are
    /// ignored.
    pub fn merge_from(&mut self, other: &Schema) {
        let Value::Object(document) = &other.document else {
            return;
        };

        for key in document.keys() {
            match key.as_str() {
                "$schema" => self.dialect = other.dialect.clone(),
                "$id" => self.id = other.id.clone(),
                "$ref" => self.reference = other.reference.clone(),
                "$comment" => self.comment = other.comment.clone(),
                "title" => self.title = other.title.clone(),
                "description" => self.description = other.description.clone(),
                "markdownDescription" => {
                    self.markdown_description = other.markdown_description.clone()
                }
                "type" => self.types = other.types.clone(),
                "properties" => self.properties = other.properties.clone(),
                "patternProperties" => self.pattern_properties = other.pattern_properties.clone(),
                "additionalProperties" => {
                    self.additional_properties = other.additional_properties.clone()
                }
                "propertyNames" => self.property_names = other.property_names,
                "definitions" | "$defs" => self.definitions = other.definitions.clone(),
                "items" => {
                    self.items = other.items;
                    self.prefix_items = other.prefix_items.clone();
                }
                "prefixItems" => self.prefix_items = other.prefix_items.clone(),
                "additionalItems" => self.additional_items = other.additional_items.clone(),
                "contains" => self.contains = other.contains,
                "allOf" => self.all_of = other.all_of.clone(),
                "anyOf" => self.any_of = other.any_of.clone(),
                "oneOf" => self.one_of = other.one_of.clone(),
                "not" => self.not = other.not.clone(),
                "if" => self.if_schema = other.if_schema,
                "then" => self.then_schema = other.then_schema,
                "else" => self.else_schema = other.else_schema,
                "const" => self.const_value = other.const_value.clone(),
                "default" => self.default = other.default.clone(),
                "enum" => self.enum_values = other.enum_values.clone(),
                "enumDescriptions" => self.enum_descriptions = other.enum_descriptions.clone(),
                "examples" => self.examples = other.examples.clone(),
                "required" => self.required = other.required.clone(),
                "maximum" => self.maximum = other.maximum,
                "minimum" => self.minimum = other.minimum,
                "exclusiveMaximum" => self.exclusive_maximum = other.exclusive_maximum.clone(),
                "exclusiveMinimum" => self.exclusive_minimum = other.exclusive_minimum.clone(),
                "multipleOf" => self.multiple_of = other.multiple_of,
                "maxLength" => self.max_length = other.max_length,
                "minLength" => self.min_length = other.min_length,
                "maxItems" => self.max_items = other.max_items,
                "minItems" => self.min_items = other.min_items,
                "maxProperties" => self.max_properties = other.max_properties,
                "minProperties" => self.min_properties = other.min_properties,
                "maxContains" => self.max_contains = other.max_contains,
                "minContains" => self.min_contains = other.min_contains,
                "pattern" => self.pattern = other.pattern.clone(),
                "format" => self.format = other.format.clone(),
                "contentEncoding" => self.content_encoding = other.content_encoding.clone(),
                "contentMediaType" => self.content_media_type = other.content_media_type.clone(),
                "deprecated" => self.deprecated = other.deprecated,
                "readOnly" => self.read_only = other.read_only,
                "writeOnly" => self.write_only = other.write_only,
                "uniqueItems" => self.unique_items = other.unique_items,
                "unevaluatedProperties" => {
                    self.unevaluated_properties = other.unevaluated_properties.clone()
                }
                _ => {}
            }
        }
    }

    /// Every child node, in a fixed order matching [`child_ids_mut`](Self::child_ids_mut).
    pub fn child_ids(&self) -> Vec<SchemaId> {
        let mut ids = Vec::new();
        ids.extend(self.items);
        ids.extend(self.property_names);
        ids.extend(self.contains);
        ids.extend(self.if_schema);
        ids.extend(self.then_schema);
        ids.extend(self.else_schema);
        ids.extend(self.prefix_items.iter().copied());
        ids.extend(self.all_of.iter().copied());
        ids.extend(self.any_of.iter().copied());
        ids.extend(self.one_of.iter().copied());
        ids.extend(self.not.iter().copied());
        ids.extend(self.properties.ids());
        ids.extend(self.pattern_properties.ids());
        ids.extend(self.definitions.ids());
        ids
    }

    pub(crate) fn child_ids_mut(&mut self) -> Vec<&mut SchemaId> {
        let mut slots = Vec::new();
        slots.extend(self.items.as_mut());
        slots.extend(self.property_names.as_mut());
        slots.extend(self.contains.as_mut());
        slots.extend(self.if_schema.as_mut());
        slots.extend(self.then_schema.as_mut());
        slots.extend(self.else_schema.as_mut());
        slots.extend(self.prefix_items.iter_mut());
        slots.extend(self.all_of.iter_mut());
        slots.extend(self.any_of.iter_mut());
        slots.extend(self.one_of.iter_mut());
        slots.extend(self.not.iter_mut());
        slots.extend(self.properties.ids_mut());
        slots.extend(self.pattern_properties.ids_mut());
        slots.extend(self.definitions.ids_mut());
        slots
    }
}
