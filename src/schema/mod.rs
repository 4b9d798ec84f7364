//! API definition model
//!
//! The normalized, strongly-typed view of a Swagger/OpenAPI document:
//! operations, their parameters, request bodies and declared responses.
//! Schemas are a tagged [`SchemaKind`] so every consumer has to handle
//! every kind explicitly.

pub mod normalizer;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use normalizer::SchemaNormalizer;

/// HTTP methods an operation can be declared under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Parse a path-item key; non-method keys yield `None`
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "put" => Some(HttpMethod::Put),
            "post" => Some(HttpMethod::Post),
            "delete" => Some(HttpMethod::Delete),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            "patch" => Some(HttpMethod::Patch),
            "trace" => Some(HttpMethod::Trace),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraints that apply to string values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringConstraints {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub format: Option<String>,
}

/// Constraints that apply to integer and number values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericConstraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub format: Option<String>,
}

/// Array shape and item constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

/// Object shape; properties keep declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub properties: Vec<(String, Schema)>,
    pub required: Vec<String>,
}

impl ObjectSchema {
    pub fn property(&self, name: &str) -> Option<&Schema> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }
}

/// The kind of value a schema describes, with kind-specific constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SchemaKind {
    String(StringConstraints),
    Integer(NumericConstraints),
    Number(NumericConstraints),
    Boolean,
    Array(ArraySchema),
    Object(ObjectSchema),
}

impl SchemaKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::String(_) => "string",
            SchemaKind::Integer(_) => "integer",
            SchemaKind::Number(_) => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array(_) => "array",
            SchemaKind::Object(_) => "object",
        }
    }
}

/// A normalized schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub kind: SchemaKind,
    /// `Some(vec![])` is an explicitly empty enum, distinct from no enum
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<Value>,
    pub example: Option<Value>,
    pub nullable: bool,
}

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            enum_values: None,
            default: None,
            example: None,
            nullable: false,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String(StringConstraints::default()))
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Integer(NumericConstraints::default()))
    }

    pub fn empty_object() -> Self {
        Self::new(SchemaKind::Object(ObjectSchema::default()))
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            SchemaKind::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Top-level field names a value of this schema carries.
    /// Arrays of objects expose their item fields.
    pub fn field_names(&self) -> Vec<String> {
        match &self.kind {
            SchemaKind::Object(obj) => obj.property_names().map(str::to_string).collect(),
            SchemaKind::Array(arr) => arr.items.field_names(),
            _ => Vec::new(),
        }
    }
}

/// Where a raw parameter was declared, exactly as written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationParameter {
    pub name: String,
    /// The raw `in` value (`path`, `query`, `header`, `formData`, `cookie`, ...)
    pub location: String,
    pub schema: Schema,
    pub required: bool,
}

/// A declared request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub schema: Schema,
    pub required: bool,
    pub content_type: String,
}

/// Which response statuses a declaration covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMatcher {
    Code(u16),
    /// `4XX` style range, holding the leading digit
    Range(u8),
    Default,
}

impl StatusMatcher {
    pub fn parse(key: &str) -> Option<Self> {
        if key.eq_ignore_ascii_case("default") {
            return Some(StatusMatcher::Default);
        }
        if key.len() == 3 && key[1..].eq_ignore_ascii_case("xx") {
            let digit = key[..1].parse::<u8>().ok()?;
            return (1..=5).contains(&digit).then_some(StatusMatcher::Range(digit));
        }
        key.parse::<u16>().ok().map(StatusMatcher::Code)
    }

    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusMatcher::Code(code) => *code == status,
            StatusMatcher::Range(digit) => status / 100 == u16::from(*digit),
            StatusMatcher::Default => true,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            StatusMatcher::Code(code) => (200..300).contains(code),
            StatusMatcher::Range(digit) => *digit == 2,
            StatusMatcher::Default => false,
        }
    }
}

/// A declared response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub status: StatusMatcher,
    pub schema: Option<Schema>,
}

/// One normalized API operation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub method: HttpMethod,
    pub path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<OperationParameter>,
    pub request_body: Option<RequestBody>,
    pub responses: Vec<ResponseSpec>,
}

impl Operation {
    /// `METHOD /path`, the identity used in logs and findings
    pub fn identity(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Placeholder names of a templated path, in order
    pub fn path_placeholders(&self) -> Vec<String> {
        path_placeholders(&self.path)
    }
}

/// Extract `{name}` placeholders from a path template
pub fn path_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &rest[start + len + 1..];
    }
    names
}

/// The normalized definition: where to send requests and what to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub title: Option<String>,
    pub version: Option<String>,
    /// Declared server URLs, absolute or relative, in declaration order
    pub servers: Vec<String>,
    /// Path prefix that applies to every operation (Swagger `basePath`)
    pub base_path: String,
    pub operations: Vec<Operation>,
}
