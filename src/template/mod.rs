//! Fuzz templates
//!
//! A [`FuzzTemplate`] is the compiled, mutation-annotated skeleton of one
//! operation: an ordered list of mutable fields, each bound to a request
//! slot, plus the static parts of the request that are never mutated.

pub mod compiler;
pub mod request;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{Operation, Schema, StatusMatcher};

pub use compiler::{resolve_base_url, CompileReport, TemplateCompiler};
pub use request::{FieldValue, HttpRequest, RequestBuilder};

/// Field name of the whole-body slot
pub const WHOLE_BODY: &str = "$body";

/// Request slot a field is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldLocation {
    Path,
    Query,
    Header,
    Body,
}

impl FieldLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLocation::Path => "path",
            FieldLocation::Query => "query",
            FieldLocation::Header => "header",
            FieldLocation::Body => "body",
        }
    }

    /// Ordering rank used when laying out template fields
    fn rank(&self) -> u8 {
        match self {
            FieldLocation::Path => 0,
            FieldLocation::Query => 1,
            FieldLocation::Header => 2,
            FieldLocation::Body => 3,
        }
    }
}

impl std::fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How body fields are encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Json,
    Form,
}

impl BodyEncoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyEncoding::Json => "application/json",
            BodyEncoding::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// Parameter descriptor: what a field is and where it goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub location: FieldLocation,
    pub schema: Schema,
    pub required: bool,
}

impl FieldDescriptor {
    /// `location:name`, stable across runs
    pub fn slot(&self) -> String {
        format!("{}:{}", self.location, self.name)
    }

    pub fn is_whole_body(&self) -> bool {
        self.location == FieldLocation::Body && self.name == WHOLE_BODY
    }
}

/// A field the fuzzer may mutate, with its valid baseline value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutableField {
    pub descriptor: FieldDescriptor,
    pub baseline: Value,
}

/// What a declared response promises structurally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseExpectation {
    pub status: StatusMatcher,
    /// Top-level fields the response object must carry
    pub required_fields: Vec<String>,
    /// Whether the declared body is a JSON object
    pub expects_object: bool,
}

/// Compiled request skeleton for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzTemplate {
    pub operation: Operation,
    /// Absolute base URL, no trailing slash
    pub base_url: String,
    /// Mutable fields: path, query, header, body
    pub fields: Vec<MutableField>,
    /// Headers sent as-is (`Accept`, `Content-Type`)
    pub static_headers: Vec<(String, String)>,
    pub body_encoding: Option<BodyEncoding>,
    pub expectations: Vec<ResponseExpectation>,
    /// Field names the operation's success responses declare
    pub response_fields: Vec<String>,
}

impl FuzzTemplate {
    pub fn identity(&self) -> String {
        self.operation.identity()
    }

    /// Whether any request field (other than the whole body) carries `name`
    pub fn consumes(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| !f.descriptor.is_whole_body() && f.descriptor.name == name)
    }

    pub fn produces(&self, name: &str) -> bool {
        self.response_fields.iter().any(|f| f == name)
    }

    /// Distinct consumable field names, in field order
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            let name = field.descriptor.name.as_str();
            if !field.descriptor.is_whole_body() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Best matching expectation: exact code, then range, then default
    pub fn expectation_for(&self, status: u16) -> Option<&ResponseExpectation> {
        let exact = self
            .expectations
            .iter()
            .find(|e| matches!(e.status, StatusMatcher::Code(c) if c == status));
        let range = || {
            self.expectations
                .iter()
                .find(|e| matches!(e.status, StatusMatcher::Range(_)) && e.status.matches(status))
        };
        let default = || {
            self.expectations
                .iter()
                .find(|e| e.status == StatusMatcher::Default)
        };
        exact.or_else(range).or_else(default)
    }

    pub(crate) fn sort_fields(fields: &mut [MutableField]) {
        // Stable: keeps declaration order within a location
        fields.sort_by_key(|f| f.descriptor.location.rank());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{HttpMethod, Operation};

    fn template_with(expectations: Vec<ResponseExpectation>) -> FuzzTemplate {
        FuzzTemplate {
            operation: Operation {
                method: HttpMethod::Get,
                path: "/things".to_string(),
                operation_id: None,
                parameters: vec![],
                request_body: None,
                responses: vec![],
            },
            base_url: "http://localhost".to_string(),
            fields: vec![],
            static_headers: vec![],
            body_encoding: None,
            expectations,
            response_fields: vec![],
        }
    }

    fn expectation(status: StatusMatcher, field: &str) -> ResponseExpectation {
        ResponseExpectation {
            status,
            required_fields: vec![field.to_string()],
            expects_object: true,
        }
    }

    #[test]
    fn expectation_precedence() {
        let template = template_with(vec![
            expectation(StatusMatcher::Default, "default"),
            expectation(StatusMatcher::Range(4), "range"),
            expectation(StatusMatcher::Code(404), "exact"),
        ]);
        let field = |s: u16| template.expectation_for(s).map(|e| e.required_fields[0].clone());
        assert_eq!(field(404).as_deref(), Some("exact"));
        assert_eq!(field(400).as_deref(), Some("range"));
        assert_eq!(field(500).as_deref(), Some("default"));
    }

    #[test]
    fn no_expectation_without_declarations() {
        assert!(template_with(vec![]).expectation_for(200).is_none());
    }

    #[test]
    fn location_names() {
        assert_eq!(FieldLocation::Query.to_string(), "query");
        assert_eq!(BodyEncoding::Form.content_type(), "application/x-www-form-urlencoded");
    }
}
