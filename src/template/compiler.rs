//! Template Compiler - Operation to fuzz template
//!
//! Each operation compiles to exactly one [`FuzzTemplate`] or one
//! [`TemplateCompileError`]. The compiler also owns base URL resolution,
//! which is shared by every template of a run.

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::errors::TemplateCompileError;
use crate::schema::{
    ApiDefinition, NumericConstraints, Operation, Schema, SchemaKind, StringConstraints,
};

use super::{
    BodyEncoding, FieldDescriptor, FieldLocation, FuzzTemplate, MutableField,
    ResponseExpectation, WHOLE_BODY,
};

/// Upper bound on synthesized collection and string sizes
const MAX_SYNTHESIZED_LEN: u64 = 64;

/// Header parameters the request layer owns
const RESERVED_HEADERS: &[&str] = &["accept", "content-type", "authorization"];

/// Outcome of compiling a whole definition
#[derive(Debug, Default)]
pub struct CompileReport {
    pub templates: Vec<FuzzTemplate>,
    /// One entry per skipped operation, in declaration order
    pub failures: Vec<TemplateCompileError>,
}

/// Compiles operations against a resolved base URL
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    base_url: String,
}

impl TemplateCompiler {
    /// Resolve the base URL once for the whole definition
    pub fn new(
        definition: &ApiDefinition,
        override_url: Option<&str>,
    ) -> Result<Self, TemplateCompileError> {
        let base_url = resolve_base_url(definition, override_url)?;
        debug!("Resolved base URL: {}", base_url);
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Compile every operation, collecting failures instead of stopping
    pub fn compile_all(&self, operations: &[Operation]) -> CompileReport {
        let mut report = CompileReport::default();
        for operation in operations {
            match self.compile(operation) {
                Ok(template) => report.templates.push(template),
                Err(e) => {
                    warn!("Skipping {}: {}", operation.identity(), e);
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Compile one operation
    pub fn compile(&self, operation: &Operation) -> Result<FuzzTemplate, TemplateCompileError> {
        let identity = operation.identity();
        let mut fields = Vec::new();
        let mut form_data = false;

        for param in &operation.parameters {
            let location = match param.location.as_str() {
                "path" => FieldLocation::Path,
                "query" => FieldLocation::Query,
                "header" => FieldLocation::Header,
                "formData" => {
                    form_data = true;
                    FieldLocation::Body
                }
                other => {
                    return Err(TemplateCompileError::InvalidLocation {
                        operation: identity,
                        name: param.name.clone(),
                        location: other.to_string(),
                    })
                }
            };

            if location == FieldLocation::Header
                && RESERVED_HEADERS.contains(&param.name.to_ascii_lowercase().as_str())
            {
                debug!("{}: ignoring reserved header parameter {}", identity, param.name);
                continue;
            }

            check_schema(&identity, &param.name, &param.schema, param.required)?;
            fields.push(MutableField {
                baseline: baseline_value(&param.schema),
                descriptor: FieldDescriptor {
                    name: param.name.clone(),
                    location,
                    schema: param.schema.clone(),
                    required: param.required,
                },
            });
        }

        let mut body_encoding = form_data.then_some(BodyEncoding::Form);

        if let Some(body) = &operation.request_body {
            check_schema(&identity, WHOLE_BODY, &body.schema, body.required)?;
            let encoding = if body.content_type.contains("form") {
                BodyEncoding::Form
            } else {
                BodyEncoding::Json
            };
            body_encoding = Some(encoding);

            if let SchemaKind::Object(obj) = &body.schema.kind {
                for (name, schema) in &obj.properties {
                    fields.push(MutableField {
                        baseline: baseline_value(schema),
                        descriptor: FieldDescriptor {
                            name: name.clone(),
                            location: FieldLocation::Body,
                            schema: schema.clone(),
                            required: obj.required.contains(name),
                        },
                    });
                }
            }
            fields.push(MutableField {
                baseline: baseline_value(&body.schema),
                descriptor: FieldDescriptor {
                    name: WHOLE_BODY.to_string(),
                    location: FieldLocation::Body,
                    schema: body.schema.clone(),
                    required: body.required,
                },
            });
        }

        FuzzTemplate::sort_fields(&mut fields);

        let mut static_headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(encoding) = body_encoding {
            static_headers.push(("Content-Type".to_string(), encoding.content_type().to_string()));
        }

        let expectations = operation
            .responses
            .iter()
            .map(|spec| {
                let object = spec.schema.as_ref().and_then(Schema::as_object);
                ResponseExpectation {
                    status: spec.status,
                    required_fields: object.map(|o| o.required.clone()).unwrap_or_default(),
                    expects_object: object.is_some(),
                }
            })
            .collect();

        let mut response_fields: Vec<String> = Vec::new();
        for spec in operation.responses.iter().filter(|r| r.status.is_success()) {
            if let Some(schema) = &spec.schema {
                for name in schema.field_names() {
                    if !response_fields.contains(&name) {
                        response_fields.push(name);
                    }
                }
            }
        }

        Ok(FuzzTemplate {
            operation: operation.clone(),
            base_url: self.base_url.clone(),
            fields,
            static_headers,
            body_encoding,
            expectations,
            response_fields,
        })
    }
}

/// Resolve the absolute base URL requests are sent to.
///
/// An override always wins. It keeps its own path when it has one; otherwise
/// the definition's base path is appended. Without an override the first
/// absolute server declared by the definition is used.
pub fn resolve_base_url(
    definition: &ApiDefinition,
    override_url: Option<&str>,
) -> Result<String, TemplateCompileError> {
    if let Some(raw) = override_url {
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        let url = Url::parse(&candidate).map_err(|e| TemplateCompileError::UnresolvableBaseUrl {
            detail: format!("invalid override URL '{}': {}", raw, e),
        })?;
        if url.host_str().is_none() {
            return Err(TemplateCompileError::UnresolvableBaseUrl {
                detail: format!("override URL '{}' has no host", raw),
            });
        }
        let origin = url.origin().ascii_serialization();
        let own_path = url.path().trim_end_matches('/');
        let path = if own_path.is_empty() {
            definition_base_path(definition)
        } else {
            own_path.to_string()
        };
        return Ok(format!("{}{}", origin, path));
    }

    let server = definition.servers.iter().find_map(|s| {
        Url::parse(s)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .map(|_| s.trim_end_matches('/'))
    });
    match server {
        Some(server) => Ok(format!(
            "{}{}",
            server,
            normalize_path(&definition.base_path)
        )),
        None => Err(TemplateCompileError::UnresolvableBaseUrl {
            detail: "the definition declares no absolute server and no override URL was given"
                .to_string(),
        }),
    }
}

/// Swagger `basePath`, or the path of the first declared server
fn definition_base_path(definition: &ApiDefinition) -> String {
    if !definition.base_path.is_empty() {
        return normalize_path(&definition.base_path);
    }
    match definition.servers.first() {
        Some(server) => match Url::parse(server) {
            Ok(url) => normalize_path(url.path()),
            Err(_) if server.starts_with('/') => normalize_path(server),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Reject fields no value can be generated for safely
fn check_schema(
    operation: &str,
    name: &str,
    schema: &Schema,
    required: bool,
) -> Result<(), TemplateCompileError> {
    let unsatisfiable = |detail: String| TemplateCompileError::UnsatisfiableConstraints {
        operation: operation.to_string(),
        name: name.to_string(),
        detail,
    };

    if required && schema.enum_values.as_ref().is_some_and(Vec::is_empty) {
        return Err(TemplateCompileError::EmptyEnum {
            operation: operation.to_string(),
            name: name.to_string(),
        });
    }

    match &schema.kind {
        SchemaKind::String(c) => {
            if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
                if min > max {
                    return Err(unsatisfiable(format!("minLength {} > maxLength {}", min, max)));
                }
            }
        }
        SchemaKind::Integer(c) | SchemaKind::Number(c) => {
            if let (Some(min), Some(max)) = (c.minimum, c.maximum) {
                let empty = min > max
                    || (min == max && (c.exclusive_minimum || c.exclusive_maximum));
                if empty {
                    return Err(unsatisfiable(format!("minimum {} > maximum {}", min, max)));
                }
            }
        }
        SchemaKind::Boolean => {}
        SchemaKind::Array(arr) => {
            if let (Some(min), Some(max)) = (arr.min_items, arr.max_items) {
                if min > max {
                    return Err(unsatisfiable(format!("minItems {} > maxItems {}", min, max)));
                }
            }
            check_schema(operation, &format!("{}[]", name), &arr.items, false)?;
        }
        SchemaKind::Object(obj) => {
            for (prop, prop_schema) in &obj.properties {
                let required = obj.required.iter().any(|r| r == prop);
                check_schema(operation, &format!("{}.{}", name, prop), prop_schema, required)?;
            }
        }
    }
    Ok(())
}

/// A valid value for `schema`: default, example, first enum value, or a
/// synthesized value that honours the declared constraints
pub fn baseline_value(schema: &Schema) -> Value {
    if let Some(default) = &schema.default {
        return default.clone();
    }
    if let Some(example) = &schema.example {
        return example.clone();
    }
    if let Some(first) = schema.enum_values.as_ref().and_then(|e| e.first()) {
        return first.clone();
    }

    match &schema.kind {
        SchemaKind::String(c) => Value::String(synthesize_string(c)),
        SchemaKind::Integer(c) => json!(synthesize_integer(c)),
        SchemaKind::Number(c) => json!(synthesize_number(c)),
        SchemaKind::Boolean => Value::Bool(true),
        SchemaKind::Array(arr) => {
            let mut count = arr.min_items.unwrap_or(1).clamp(1, MAX_SYNTHESIZED_LEN);
            if let Some(max) = arr.max_items {
                count = count.min(max);
            }
            Value::Array((0..count).map(|_| baseline_value(&arr.items)).collect())
        }
        SchemaKind::Object(obj) => {
            let map: Map<String, Value> = obj
                .properties
                .iter()
                .map(|(name, prop)| (name.clone(), baseline_value(prop)))
                .collect();
            Value::Object(map)
        }
    }
}

fn synthesize_string(c: &StringConstraints) -> String {
    let base = match c.format.as_deref() {
        Some("date") => "2024-01-01",
        Some("date-time") => "2024-01-01T00:00:00Z",
        Some("time") => "12:00:00",
        Some("uuid") => "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        Some("email") => "user@example.com",
        Some("uri") | Some("url") | Some("uri-reference") => "http://example.com/",
        Some("hostname") => "example.com",
        Some("ipv4") => "192.0.2.1",
        Some("ipv6") => "2001:db8::1",
        Some("byte") => "YWJj",
        Some("password") => "Passw0rd!",
        _ => "a",
    };

    let mut value = match c.pattern.as_deref().and_then(|p| Regex::new(p).ok()) {
        Some(re) if !re.is_match(base) => ["a", "1", "A", "abc", "123", "a1", "A1"]
            .into_iter()
            .find(|s| re.is_match(s))
            .unwrap_or(base)
            .to_string(),
        _ => base.to_string(),
    };

    let min = c.min_length.unwrap_or(0).min(MAX_SYNTHESIZED_LEN) as usize;
    let len = value.chars().count();
    if len < min {
        value.push_str(&"a".repeat(min - len));
    }
    if let Some(max) = c.max_length {
        let max = max as usize;
        if value.chars().count() > max {
            value = value.chars().take(max).collect();
        }
    }
    value
}

fn synthesize_integer(c: &NumericConstraints) -> i64 {
    let mut value: i64 = 1;
    if let Some(min) = c.minimum {
        let low = if c.exclusive_minimum {
            (min.floor() as i64).saturating_add(1)
        } else {
            min.ceil() as i64
        };
        value = value.max(low);
    }
    if let Some(max) = c.maximum {
        let high = if c.exclusive_maximum {
            (max.ceil() as i64).saturating_sub(1)
        } else {
            max.floor() as i64
        };
        value = value.min(high);
    }
    value
}

fn synthesize_number(c: &NumericConstraints) -> f64 {
    let above = |v: f64| match c.minimum {
        Some(min) if c.exclusive_minimum => v > min,
        Some(min) => v >= min,
        None => true,
    };
    let below = |v: f64| match c.maximum {
        Some(max) if c.exclusive_maximum => v < max,
        Some(max) => v <= max,
        None => true,
    };

    let mut value = 1.0;
    if !above(value) {
        if let Some(min) = c.minimum {
            value = if c.exclusive_minimum { min + 1.0 } else { min };
        }
    }
    if !below(value) {
        if let Some(max) = c.maximum {
            value = if c.exclusive_maximum { max - 1.0 } else { max };
        }
    }
    if !(above(value) && below(value)) {
        if let (Some(min), Some(max)) = (c.minimum, c.maximum) {
            value = (min + max) / 2.0;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNormalizer;

    fn compile_one(definition: Value) -> Result<FuzzTemplate, TemplateCompileError> {
        let api = SchemaNormalizer::normalize(&definition).unwrap();
        let compiler = TemplateCompiler::new(&api, Some("http://localhost:8080")).unwrap();
        compiler.compile(&api.operations[0])
    }

    fn swagger(paths: Value) -> Value {
        json!({"swagger": "2.0", "host": "api.test", "basePath": "/v1", "paths": paths})
    }

    #[test]
    fn fields_are_ordered_by_location() {
        let template = compile_one(swagger(json!({
            "/users/{id}": {"post": {
                "parameters": [
                    {"name": "X-Trace", "in": "header", "type": "string"},
                    {"name": "body", "in": "body", "schema": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {"name": {"type": "string"}, "age": {"type": "integer"}}
                    }},
                    {"name": "verbose", "in": "query", "type": "boolean"},
                    {"name": "id", "in": "path", "type": "integer"}
                ]
            }}
        })))
        .unwrap();

        let slots: Vec<String> = template.fields.iter().map(|f| f.descriptor.slot()).collect();
        assert_eq!(
            slots,
            vec!["path:id", "query:verbose", "header:X-Trace", "body:name", "body:age", "body:$body"]
        );
        assert!(template.fields[3].descriptor.required);
        assert!(!template.fields[4].descriptor.required);
        assert_eq!(template.body_encoding, Some(BodyEncoding::Json));
        assert_eq!(template.fields[5].baseline, json!({"name": "a", "age": 1}));
    }

    #[test]
    fn form_data_is_form_encoded_body() {
        let template = compile_one(swagger(json!({
            "/upload": {"post": {"parameters": [
                {"name": "file", "in": "formData", "type": "file", "required": true},
                {"name": "label", "in": "formData", "type": "string"}
            ]}}
        })))
        .unwrap();
        assert_eq!(template.body_encoding, Some(BodyEncoding::Form));
        assert!(template
            .static_headers
            .contains(&("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string())));
        assert!(template
            .fields
            .iter()
            .all(|f| f.descriptor.location == FieldLocation::Body && !f.descriptor.is_whole_body()));
    }

    #[test]
    fn cookie_parameter_is_invalid_location() {
        let err = compile_one(json!({
            "openapi": "3.0.0",
            "paths": {"/a": {"get": {"parameters": [
                {"name": "session", "in": "cookie", "schema": {"type": "string"}}
            ]}}}
        }))
        .unwrap_err();
        assert!(matches!(err, TemplateCompileError::InvalidLocation { ref location, .. } if location == "cookie"));
        assert_eq!(err.operation(), Some("GET /a"));
    }

    #[test]
    fn required_empty_enum_fails() {
        let err = compile_one(swagger(json!({
            "/a": {"get": {"parameters": [
                {"name": "mode", "in": "query", "type": "string", "enum": [], "required": true}
            ]}}
        })))
        .unwrap_err();
        assert!(matches!(err, TemplateCompileError::EmptyEnum { .. }));
    }

    #[test]
    fn optional_empty_enum_compiles() {
        let template = compile_one(swagger(json!({
            "/a": {"get": {"parameters": [
                {"name": "mode", "in": "query", "type": "string", "enum": []}
            ]}}
        })))
        .unwrap();
        assert_eq!(template.fields[0].baseline, json!("a"));
    }

    #[test]
    fn inverted_bounds_fail() {
        let err = compile_one(swagger(json!({
            "/a": {"get": {"parameters": [
                {"name": "n", "in": "query", "type": "integer", "minimum": 10, "maximum": 2}
            ]}}
        })))
        .unwrap_err();
        assert!(matches!(err, TemplateCompileError::UnsatisfiableConstraints { .. }));
    }

    #[test]
    fn compile_all_counts_failures() {
        let api = SchemaNormalizer::normalize(&swagger(json!({
            "/ok": {"get": {}},
            "/bad": {"get": {"parameters": [{"name": "c", "in": "cookie", "type": "string"}]}},
            "/also-ok": {"delete": {}}
        })))
        .unwrap();
        let compiler = TemplateCompiler::new(&api, None).unwrap();
        let report = compiler.compile_all(&api.operations);
        assert_eq!(report.templates.len() + report.failures.len(), api.operations.len());
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn baseline_precedence() {
        let mut schema = Schema::integer();
        schema.enum_values = Some(vec![json!(7), json!(8)]);
        assert_eq!(baseline_value(&schema), json!(7));
        schema.example = Some(json!(5));
        assert_eq!(baseline_value(&schema), json!(5));
        schema.default = Some(json!(3));
        assert_eq!(baseline_value(&schema), json!(3));
    }

    #[test]
    fn synthesized_values_honour_constraints() {
        let int = NumericConstraints {
            minimum: Some(10.0),
            maximum: Some(20.0),
            ..Default::default()
        };
        assert_eq!(synthesize_integer(&int), 10);

        let exclusive = NumericConstraints {
            maximum: Some(0.0),
            exclusive_maximum: true,
            ..Default::default()
        };
        assert_eq!(synthesize_integer(&exclusive), -1);

        let unit = NumericConstraints {
            minimum: Some(0.0),
            maximum: Some(1.0),
            exclusive_minimum: true,
            exclusive_maximum: true,
            format: None,
        };
        assert_eq!(synthesize_number(&unit), 0.5);

        let s = StringConstraints {
            min_length: Some(5),
            max_length: Some(8),
            ..Default::default()
        };
        assert_eq!(synthesize_string(&s), "aaaaa");

        let digits = StringConstraints {
            pattern: Some("^[0-9]+$".to_string()),
            ..Default::default()
        };
        assert_eq!(synthesize_string(&digits), "1");
    }

    #[test]
    fn response_expectations_and_fields() {
        let template = compile_one(json!({
            "openapi": "3.0.0",
            "paths": {"/items": {"post": {"responses": {
                "201": {"content": {"application/json": {"schema": {
                    "type": "object", "required": ["id"],
                    "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
                }}}},
                "400": {"description": "bad"}
            }}}}
        }))
        .unwrap();
        assert_eq!(template.response_fields, vec!["id", "name"]);
        let created = template.expectation_for(201).unwrap();
        assert_eq!(created.required_fields, vec!["id"]);
        assert!(created.expects_object);
        assert!(!template.expectation_for(400).unwrap().expects_object);
    }

    fn api(servers: Vec<&str>, base_path: &str) -> ApiDefinition {
        ApiDefinition {
            title: None,
            version: None,
            servers: servers.into_iter().map(str::to_string).collect(),
            base_path: base_path.to_string(),
            operations: vec![],
        }
    }

    #[test]
    fn override_wins_and_keeps_base_path() {
        let def = api(vec!["http://declared.test"], "/v1");
        assert_eq!(
            resolve_base_url(&def, Some("http://localhost:9000")).unwrap(),
            "http://localhost:9000/v1"
        );
        assert_eq!(
            resolve_base_url(&def, Some("http://localhost:9000/custom/")).unwrap(),
            "http://localhost:9000/custom"
        );
        assert_eq!(
            resolve_base_url(&def, Some("localhost:9000")).unwrap(),
            "http://localhost:9000/v1"
        );
    }

    #[test]
    fn override_inherits_openapi_server_path() {
        let def = api(vec!["https://prod.test/api/v2"], "");
        assert_eq!(
            resolve_base_url(&def, Some("http://127.0.0.1:3000")).unwrap(),
            "http://127.0.0.1:3000/api/v2"
        );
    }

    #[test]
    fn declared_server_without_override() {
        let def = api(vec!["/relative", "https://prod.test/api/"], "");
        assert_eq!(resolve_base_url(&def, None).unwrap(), "https://prod.test/api");
    }

    #[test]
    fn no_base_url_is_an_error() {
        let def = api(vec!["/relative"], "");
        let err = resolve_base_url(&def, None).unwrap_err();
        assert!(matches!(err, TemplateCompileError::UnresolvableBaseUrl { .. }));
    }

    #[test]
    fn exclusive_bounds_at_int64_limits() {
        let upper = NumericConstraints {
            maximum: Some(i64::MAX as f64),
            exclusive_maximum: true,
            ..NumericConstraints::default()
        };
        assert_eq!(synthesize_integer(&upper), 1);

        let lower = NumericConstraints {
            minimum: Some(i64::MAX as f64),
            exclusive_minimum: true,
            ..NumericConstraints::default()
        };
        assert_eq!(synthesize_integer(&lower), i64::MAX);

        let floor = NumericConstraints {
            maximum: Some(i64::MIN as f64),
            exclusive_maximum: true,
            ..NumericConstraints::default()
        };
        assert_eq!(synthesize_integer(&floor), i64::MIN);
    }
}
