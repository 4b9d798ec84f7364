//! Schema Normalizer
//!
//! Turns a raw Swagger 2.0 / OpenAPI 3.x document (already parsed into a
//! `serde_json::Value`) into an [`ApiDefinition`]. The transformation is
//! pure. Operations come out in document order: declared paths first, then
//! declared methods within each path.
//!
//! Unknown and `x-` extension keys are ignored. Missing structural keys and
//! unrecognized schema kinds are [`SchemaError`]s.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::SchemaError;

use super::{
    path_placeholders, ApiDefinition, ArraySchema, HttpMethod, NumericConstraints, ObjectSchema,
    Operation, OperationParameter, RequestBody, ResponseSpec, Schema, SchemaKind, StatusMatcher,
    StringConstraints,
};

/// Maximum `$ref` hops followed for a single parameter/response/body object
const MAX_REF_HOPS: usize = 32;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Swagger2,
    OpenApi3,
}

/// Normalizes API definitions into operations
pub struct SchemaNormalizer<'a> {
    root: &'a Value,
    dialect: Dialect,
    /// References currently being expanded, to stop recursive schemas
    expanding: Vec<String>,
}

impl<'a> SchemaNormalizer<'a> {
    /// Normalize a whole definition
    pub fn normalize(definition: &'a Value) -> Result<ApiDefinition, SchemaError> {
        let root = definition.as_object().ok_or_else(|| {
            SchemaError::InvalidDocument("the definition root is not an object".to_string())
        })?;

        let dialect = match root.get("openapi").and_then(Value::as_str) {
            Some(v) if v.starts_with('3') => Dialect::OpenApi3,
            _ => Dialect::Swagger2,
        };

        let mut normalizer = SchemaNormalizer {
            root: definition,
            dialect,
            expanding: Vec::new(),
        };

        let paths = match root.get("paths") {
            None | Some(Value::Null) => {
                return Err(SchemaError::missing("paths", "definition root"))
            }
            Some(Value::Object(paths)) => paths,
            Some(_) => {
                return Err(SchemaError::InvalidDocument(
                    "'paths' is not an object".to_string(),
                ))
            }
        };

        let mut operations = Vec::new();
        for (path, item) in paths {
            if path.starts_with("x-") {
                continue;
            }
            let item = normalizer.deref(item)?;
            let Some(item) = item.as_object() else {
                return Err(SchemaError::InvalidDocument(format!(
                    "path item '{}' is not an object",
                    path
                )));
            };

            let shared_params = match item.get("parameters") {
                Some(params) => normalizer.parameter_list(params, path)?,
                None => Vec::new(),
            };

            for (key, op) in item {
                let Some(method) = HttpMethod::from_key(key) else {
                    continue;
                };
                let operation = normalizer.operation(method, path, op, &shared_params)?;
                operations.push(operation);
            }
        }

        debug!(
            "Normalized {} operations ({:?} dialect)",
            operations.len(),
            normalizer.dialect
        );

        Ok(ApiDefinition {
            title: root
                .get("info")
                .and_then(|i| i.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
            version: root
                .get("info")
                .and_then(|i| i.get("version"))
                .and_then(Value::as_str)
                .map(str::to_string),
            servers: normalizer.servers(root),
            base_path: match dialect {
                Dialect::Swagger2 => root
                    .get("basePath")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Dialect::OpenApi3 => String::new(),
            },
            operations,
        })
    }

    /// Declared server URLs. Swagger `host` + `schemes` expand to one URL per
    /// scheme, `http` first when listed.
    fn servers(&self, root: &Map<String, Value>) -> Vec<String> {
        match self.dialect {
            Dialect::OpenApi3 => root
                .get("servers")
                .and_then(Value::as_array)
                .map(|servers| {
                    servers
                        .iter()
                        .filter_map(|s| {
                            let url = s.get("url")?.as_str()?;
                            Some(substitute_server_variables(url, s.get("variables")))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Dialect::Swagger2 => {
                let Some(host) = root.get("host").and_then(Value::as_str) else {
                    return Vec::new();
                };
                let mut schemes: Vec<&str> = root
                    .get("schemes")
                    .and_then(Value::as_array)
                    .map(|s| s.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                if schemes.is_empty() {
                    schemes.push("http");
                }
                if let Some(pos) = schemes.iter().position(|s| *s == "http") {
                    let http = schemes.remove(pos);
                    schemes.insert(0, http);
                }
                schemes
                    .into_iter()
                    .map(|scheme| format!("{}://{}", scheme, host.trim_end_matches('/')))
                    .collect()
            }
        }
    }

    fn operation(
        &mut self,
        method: HttpMethod,
        path: &str,
        op: &'a Value,
        shared_params: &[&'a Value],
    ) -> Result<Operation, SchemaError> {
        let identity = format!("{} {}", method, path);
        let op = op.as_object().ok_or_else(|| {
            SchemaError::InvalidDocument(format!("operation '{}' is not an object", identity))
        })?;

        let own_params = match op.get("parameters") {
            Some(params) => self.parameter_list(params, &identity)?,
            None => Vec::new(),
        };

        // Operation-level parameters override path-level ones with the same name/location
        let mut merged: Vec<&'a Value> = Vec::new();
        for param in shared_params.iter().chain(own_params.iter()) {
            let key = parameter_key(param, &identity)?;
            if let Some(pos) = merged
                .iter()
                .position(|p| parameter_key(p, &identity).ok().as_ref() == Some(&key))
            {
                merged[pos] = param;
            } else {
                merged.push(param);
            }
        }

        let consumes = op
            .get("consumes")
            .or_else(|| self.root.get("consumes"))
            .and_then(Value::as_array)
            .and_then(|c| c.iter().filter_map(Value::as_str).next())
            .unwrap_or(JSON_CONTENT_TYPE)
            .to_string();

        let mut parameters = Vec::new();
        let mut request_body = None;
        for param in merged {
            let (name, location) = parameter_key(param, &identity)?;
            let context = format!("{} parameter '{}'", identity, name);

            if location == "body" {
                let schema = match param.get("schema") {
                    Some(schema) => self.schema(schema, &context)?,
                    None => Schema::empty_object(),
                };
                request_body = Some(RequestBody {
                    schema,
                    required: param
                        .get("required")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    content_type: consumes.clone(),
                });
                continue;
            }

            let schema = match self.dialect {
                Dialect::OpenApi3 => match param.get("schema") {
                    Some(schema) => self.schema(schema, &context)?,
                    None => match first_content_schema(param.get("content")) {
                        Some((_, schema)) => self.schema(schema, &context)?,
                        None => Schema::string(),
                    },
                },
                // Swagger 2 non-body parameters carry their schema inline
                Dialect::Swagger2 => self.schema(param, &context)?,
            };

            let required = location == "path"
                || param
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

            parameters.push(OperationParameter {
                name,
                location,
                schema,
                required,
            });
        }

        if let Some(body) = op.get("requestBody") {
            request_body = Some(self.request_body(body, &identity)?);
        }

        for placeholder in path_placeholders(path) {
            let declared = parameters
                .iter()
                .any(|p| p.location == "path" && p.name == placeholder);
            if !declared {
                return Err(SchemaError::UndeclaredPathParameter {
                    path: path.to_string(),
                    name: placeholder,
                });
            }
        }

        let responses = match op.get("responses") {
            Some(responses) => self.responses(responses, &identity)?,
            None => Vec::new(),
        };

        Ok(Operation {
            method,
            path: path.to_string(),
            operation_id: op
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            parameters,
            request_body,
            responses,
        })
    }

    fn parameter_list(
        &mut self,
        params: &'a Value,
        context: &str,
    ) -> Result<Vec<&'a Value>, SchemaError> {
        let params = params.as_array().ok_or_else(|| {
            SchemaError::InvalidDocument(format!("'parameters' of {} is not an array", context))
        })?;
        params.iter().map(|p| self.deref(p)).collect()
    }

    fn request_body(&mut self, body: &'a Value, identity: &str) -> Result<RequestBody, SchemaError> {
        let body = self.deref(body)?;
        let context = format!("{} request body", identity);
        let (content_type, schema) = match first_content_schema(body.get("content")) {
            Some((content_type, schema)) => (content_type, self.schema(schema, &context)?),
            None => {
                let content_type = body
                    .get("content")
                    .and_then(Value::as_object)
                    .and_then(|c| c.keys().next())
                    .map(String::as_str)
                    .unwrap_or(JSON_CONTENT_TYPE);
                (content_type.to_string(), Schema::string())
            }
        };
        Ok(RequestBody {
            schema,
            required: body
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            content_type,
        })
    }

    fn responses(
        &mut self,
        responses: &'a Value,
        identity: &str,
    ) -> Result<Vec<ResponseSpec>, SchemaError> {
        let Some(responses) = responses.as_object() else {
            return Ok(Vec::new());
        };
        let mut specs = Vec::new();
        for (key, response) in responses {
            let Some(status) = StatusMatcher::parse(key) else {
                continue;
            };
            let response = self.deref(response)?;
            let context = format!("{} response {}", identity, key);
            let schema = match self.dialect {
                Dialect::Swagger2 => match response.get("schema") {
                    Some(schema) => Some(self.schema(schema, &context)?),
                    None => None,
                },
                Dialect::OpenApi3 => match first_content_schema(response.get("content")) {
                    Some((_, schema)) => Some(self.schema(schema, &context)?),
                    None => None,
                },
            };
            specs.push(ResponseSpec { status, schema });
        }
        Ok(specs)
    }

    /// Normalize one schema object
    fn schema(&mut self, value: &'a Value, context: &str) -> Result<Schema, SchemaError> {
        if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
            if self.expanding.iter().any(|r| r == reference) {
                debug!("Recursive reference {} in {}", reference, context);
                return Ok(Schema::empty_object());
            }
            let target = self.resolve(reference)?;
            self.expanding.push(reference.to_string());
            let schema = self.schema(target, context);
            self.expanding.pop();
            return schema;
        }

        let Some(obj) = value.as_object() else {
            // `true`/`{}` style schemas accept anything; treat as string
            return Ok(Schema::string());
        };

        if let Some(parts) = obj.get("allOf").and_then(Value::as_array) {
            return self.merge_all_of(obj, parts, context);
        }

        let declared_type = match obj.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };

        if declared_type.is_none() {
            let alternatives = obj
                .get("oneOf")
                .or_else(|| obj.get("anyOf"))
                .and_then(Value::as_array);
            if let Some(first) = alternatives.and_then(|a| a.first()) {
                return self.schema(first, context);
            }
        }

        let enum_values = obj.get("enum").and_then(Value::as_array).cloned();

        let kind_name = match declared_type {
            Some(t) => t,
            None if obj.contains_key("properties") => "object",
            None if obj.contains_key("items") => "array",
            None => match enum_values.as_ref().and_then(|e| e.first()) {
                Some(Value::Bool(_)) => "boolean",
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "integer",
                Some(Value::Number(_)) => "number",
                _ => "string",
            },
        };

        let kind = match kind_name {
            "string" => SchemaKind::String(string_constraints(obj)),
            "file" => SchemaKind::String(StringConstraints {
                format: Some("binary".to_string()),
                ..string_constraints(obj)
            }),
            "integer" => SchemaKind::Integer(numeric_constraints(obj)),
            "number" => SchemaKind::Number(numeric_constraints(obj)),
            "boolean" => SchemaKind::Boolean,
            "array" => {
                let items = match obj.get("items") {
                    Some(items) => self.schema(items, context)?,
                    None => Schema::string(),
                };
                SchemaKind::Array(ArraySchema {
                    items: Box::new(items),
                    min_items: obj.get("minItems").and_then(Value::as_u64),
                    max_items: obj.get("maxItems").and_then(Value::as_u64),
                })
            }
            "object" => SchemaKind::Object(self.object(obj, context)?),
            other => {
                return Err(SchemaError::UnknownKind {
                    kind: other.to_string(),
                    context: context.to_string(),
                })
            }
        };

        let nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false)
            || obj.get("x-nullable").and_then(Value::as_bool).unwrap_or(false)
            || obj
                .get("type")
                .and_then(Value::as_array)
                .is_some_and(|t| t.iter().any(|v| v == "null"));

        Ok(Schema {
            kind,
            enum_values,
            default: obj.get("default").cloned(),
            example: obj.get("example").cloned().or_else(|| {
                obj.get("examples")
                    .and_then(Value::as_array)
                    .and_then(|e| e.first())
                    .cloned()
            }),
            nullable,
        })
    }

    fn object(
        &mut self,
        obj: &'a Map<String, Value>,
        context: &str,
    ) -> Result<ObjectSchema, SchemaError> {
        let mut properties = Vec::new();
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let prop_context = format!("{}.{}", context, name);
                properties.push((name.clone(), self.schema(prop, &prop_context)?));
            }
        }
        let required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(ObjectSchema {
            properties,
            required,
        })
    }

    /// `allOf`: merge object parts; a lone non-object part stands for itself
    fn merge_all_of(
        &mut self,
        obj: &'a Map<String, Value>,
        parts: &'a [Value],
        context: &str,
    ) -> Result<Schema, SchemaError> {
        let mut merged = ObjectSchema::default();
        let mut first_non_object = None;
        let mut saw_object = false;

        let sibling = if obj.contains_key("properties") {
            Some(self.object(obj, context)?)
        } else {
            None
        };

        for part in parts {
            let schema = self.schema(part, context)?;
            match schema.kind {
                SchemaKind::Object(part_obj) => {
                    saw_object = true;
                    merge_object(&mut merged, part_obj);
                }
                _ => {
                    if first_non_object.is_none() {
                        first_non_object = Some(schema);
                    }
                }
            }
        }
        if let Some(sibling) = sibling {
            saw_object = true;
            merge_object(&mut merged, sibling);
        }

        if !saw_object {
            if let Some(schema) = first_non_object {
                return Ok(schema);
            }
        }
        Ok(Schema::new(SchemaKind::Object(merged)))
    }

    /// Follow `$ref` chains on parameter/response/body objects
    fn deref(&self, mut value: &'a Value) -> Result<&'a Value, SchemaError> {
        for _ in 0..MAX_REF_HOPS {
            match value.get("$ref").and_then(Value::as_str) {
                Some(reference) => value = self.resolve(reference)?,
                None => return Ok(value),
            }
        }
        Err(SchemaError::InvalidDocument(format!(
            "reference chain longer than {} hops",
            MAX_REF_HOPS
        )))
    }

    fn resolve(&self, reference: &str) -> Result<&'a Value, SchemaError> {
        let unresolved = || SchemaError::UnresolvedReference {
            reference: reference.to_string(),
        };
        let pointer = reference.strip_prefix('#').ok_or_else(unresolved)?;
        self.root.pointer(pointer).ok_or_else(unresolved)
    }
}

fn parameter_key(param: &Value, context: &str) -> Result<(String, String), SchemaError> {
    let name = param
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::missing("name", format!("a parameter of {}", context)))?;
    let location = param.get("in").and_then(Value::as_str).ok_or_else(|| {
        SchemaError::missing("in", format!("parameter '{}' of {}", name, context))
    })?;
    Ok((name.to_string(), location.to_string()))
}

/// Pick the most useful media type of a `content` map:
/// JSON first, then form encodings, then whatever comes first.
fn first_content_schema(content: Option<&Value>) -> Option<(String, &Value)> {
    let content = content?.as_object()?;
    let preferred = content
        .iter()
        .find(|(ct, _)| ct.as_str() == JSON_CONTENT_TYPE)
        .or_else(|| content.iter().find(|(ct, _)| ct.contains("json")))
        .or_else(|| content.iter().find(|(ct, _)| ct.as_str() == FORM_CONTENT_TYPE))
        .or_else(|| content.iter().find(|(ct, _)| ct.starts_with("multipart/")))
        .or_else(|| content.iter().next())?;
    let schema = preferred.1.get("schema")?;
    Some((preferred.0.clone(), schema))
}

fn string_constraints(obj: &Map<String, Value>) -> StringConstraints {
    StringConstraints {
        min_length: obj.get("minLength").and_then(Value::as_u64),
        max_length: obj.get("maxLength").and_then(Value::as_u64),
        pattern: obj.get("pattern").and_then(Value::as_str).map(str::to_string),
        format: obj.get("format").and_then(Value::as_str).map(str::to_string),
    }
}

fn numeric_constraints(obj: &Map<String, Value>) -> NumericConstraints {
    let mut constraints = NumericConstraints {
        minimum: obj.get("minimum").and_then(Value::as_f64),
        maximum: obj.get("maximum").and_then(Value::as_f64),
        exclusive_minimum: false,
        exclusive_maximum: false,
        format: obj.get("format").and_then(Value::as_str).map(str::to_string),
    };
    // 3.0 uses booleans, 3.1 uses the bound itself
    match obj.get("exclusiveMinimum") {
        Some(Value::Bool(b)) => constraints.exclusive_minimum = *b,
        Some(Value::Number(n)) => {
            constraints.minimum = n.as_f64();
            constraints.exclusive_minimum = true;
        }
        _ => {}
    }
    match obj.get("exclusiveMaximum") {
        Some(Value::Bool(b)) => constraints.exclusive_maximum = *b,
        Some(Value::Number(n)) => {
            constraints.maximum = n.as_f64();
            constraints.exclusive_maximum = true;
        }
        _ => {}
    }
    constraints
}

fn merge_object(into: &mut ObjectSchema, from: ObjectSchema) {
    for (name, schema) in from.properties {
        match into.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = schema,
            None => into.properties.push((name, schema)),
        }
    }
    for name in from.required {
        if !into.required.contains(&name) {
            into.required.push(name);
        }
    }
}

fn substitute_server_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(variables) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };
    let mut resolved = url.to_string();
    for (name, variable) in variables {
        if let Some(default) = variable.get("default").and_then(Value::as_str) {
            resolved = resolved.replace(&format!("{{{}}}", name), default);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn swagger_petstore() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "Petstore", "version": "1.0"},
            "host": "petstore.example.com",
            "basePath": "/v1",
            "schemes": ["https", "http"],
            "paths": {
                "/pets": {
                    "get": {
                        "parameters": [
                            {"name": "limit", "in": "query", "type": "integer", "maximum": 100}
                        ],
                        "responses": {
                            "200": {"description": "ok", "schema": {
                                "type": "array", "items": {"$ref": "#/definitions/Pet"}
                            }}
                        }
                    },
                    "post": {
                        "parameters": [
                            {"name": "pet", "in": "body", "required": true,
                             "schema": {"$ref": "#/definitions/Pet"}}
                        ],
                        "responses": {"201": {"description": "created"}}
                    },
                    "x-internal": true
                },
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "type": "integer", "minimum": 1}
                    ],
                    "get": {"responses": {"200": {"description": "ok"}}},
                    "delete": {"responses": {"204": {"description": "gone"}}}
                }
            },
            "definitions": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string", "maxLength": 32},
                        "tag": {"type": "string", "enum": ["dog", "cat"]}
                    }
                }
            }
        })
    }

    #[test]
    fn operations_in_declaration_order() {
        let def = swagger_petstore();
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let ids: Vec<String> = api.operations.iter().map(Operation::identity).collect();
        assert_eq!(
            ids,
            vec!["GET /pets", "POST /pets", "GET /pets/{petId}", "DELETE /pets/{petId}"]
        );
    }

    #[test]
    fn normalization_is_deterministic() {
        let def = swagger_petstore();
        let a = SchemaNormalizer::normalize(&def).unwrap();
        let b = SchemaNormalizer::normalize(&def).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn swagger_servers_prefer_http() {
        let def = swagger_petstore();
        let api = SchemaNormalizer::normalize(&def).unwrap();
        assert_eq!(
            api.servers,
            vec!["http://petstore.example.com", "https://petstore.example.com"]
        );
        assert_eq!(api.base_path, "/v1");
    }

    #[test]
    fn body_parameter_becomes_request_body() {
        let def = swagger_petstore();
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let post = &api.operations[1];
        assert!(post.parameters.is_empty());
        let body = post.request_body.as_ref().unwrap();
        assert!(body.required);
        let obj = body.schema.as_object().unwrap();
        assert_eq!(obj.required, vec!["name"]);
        assert_eq!(
            obj.property_names().collect::<Vec<_>>(),
            vec!["id", "name", "tag"]
        );
    }

    #[test]
    fn path_level_parameters_are_shared() {
        let def = swagger_petstore();
        let api = SchemaNormalizer::normalize(&def).unwrap();
        for op in &api.operations[2..] {
            assert_eq!(op.parameters.len(), 1);
            let param = &op.parameters[0];
            assert_eq!(param.name, "petId");
            assert!(param.required);
            match &param.schema.kind {
                SchemaKind::Integer(c) => assert_eq!(c.minimum, Some(1.0)),
                other => panic!("unexpected kind {:?}", other),
            }
        }
    }

    #[test]
    fn response_schema_fields() {
        let def = swagger_petstore();
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let list = &api.operations[0];
        let schema = list.responses[0].schema.as_ref().unwrap();
        assert_eq!(schema.field_names(), vec!["id", "name", "tag"]);
    }

    #[test]
    fn missing_paths_is_schema_error() {
        let def = json!({"swagger": "2.0", "info": {"title": "x"}});
        let err = SchemaNormalizer::normalize(&def).unwrap_err();
        assert_eq!(err, SchemaError::missing("paths", "definition root"));
    }

    #[test]
    fn non_object_root_is_invalid() {
        let err = SchemaNormalizer::normalize(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument(_)));
    }

    #[test]
    fn unknown_kind_is_schema_error() {
        let def = json!({
            "swagger": "2.0",
            "paths": {"/a": {"get": {"parameters": [
                {"name": "q", "in": "query", "type": "quaternion"}
            ]}}}
        });
        let err = SchemaNormalizer::normalize(&def).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKind { ref kind, .. } if kind == "quaternion"));
    }

    #[test]
    fn parameter_without_name_is_schema_error() {
        let def = json!({
            "swagger": "2.0",
            "paths": {"/a": {"get": {"parameters": [{"in": "query", "type": "string"}]}}}
        });
        let err = SchemaNormalizer::normalize(&def).unwrap_err();
        assert!(matches!(err, SchemaError::MissingKey { ref key, .. } if key == "name"));
    }

    #[test]
    fn undeclared_placeholder_is_schema_error() {
        let def = json!({
            "swagger": "2.0",
            "paths": {"/items/{id}": {"get": {"responses": {}}}}
        });
        let err = SchemaNormalizer::normalize(&def).unwrap_err();
        assert!(matches!(err, SchemaError::UndeclaredPathParameter { .. }));
    }

    #[test]
    fn extension_keys_are_ignored() {
        let def = json!({
            "swagger": "2.0",
            "x-vendor": {"anything": 1},
            "paths": {
                "x-meta": {"ignored": true},
                "/a": {"summary": "s", "get": {"x-rate-limit": 5, "responses": {"200": {}, "x-note": {}}}}
            }
        });
        let api = SchemaNormalizer::normalize(&def).unwrap();
        assert_eq!(api.operations.len(), 1);
        assert_eq!(api.operations[0].responses.len(), 1);
    }

    #[test]
    fn unresolved_reference() {
        let def = json!({
            "swagger": "2.0",
            "paths": {"/a": {"get": {"parameters": [{"$ref": "#/parameters/nope"}]}}}
        });
        let err = SchemaNormalizer::normalize(&def).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedReference { .. }));
    }

    #[test]
    fn openapi3_request_body_and_servers() {
        let def = json!({
            "openapi": "3.0.3",
            "servers": [{"url": "https://{region}.api.test/v2", "variables": {"region": {"default": "eu"}}}],
            "paths": {
                "/orders": {
                    "post": {
                        "requestBody": {"$ref": "#/components/requestBodies/Order"},
                        "responses": {
                            "201": {"content": {"application/json": {"schema": {
                                "type": "object",
                                "required": ["orderId"],
                                "properties": {"orderId": {"type": "string", "format": "uuid"}}
                            }}}},
                            "4XX": {"description": "bad"}
                        }
                    }
                }
            },
            "components": {
                "requestBodies": {
                    "Order": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Order"}}}
                    }
                },
                "schemas": {
                    "Order": {
                        "allOf": [
                            {"type": "object", "properties": {"qty": {"type": "integer", "minimum": 1}}},
                            {"type": "object", "required": ["sku"], "properties": {"sku": {"type": "string"}}}
                        ]
                    }
                }
            }
        });
        let api = SchemaNormalizer::normalize(&def).unwrap();
        assert_eq!(api.servers, vec!["https://eu.api.test/v2"]);
        let op = &api.operations[0];
        let body = op.request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/json");
        let obj = body.schema.as_object().unwrap();
        assert_eq!(obj.property_names().collect::<Vec<_>>(), vec!["qty", "sku"]);
        assert_eq!(obj.required, vec!["sku"]);
        assert_eq!(op.responses.len(), 2);
        assert_eq!(op.responses[1].status, StatusMatcher::Range(4));
    }

    #[test]
    fn recursive_schema_terminates() {
        let def = json!({
            "openapi": "3.0.0",
            "paths": {"/tree": {"post": {
                "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Node"}}}}
            }}},
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {"children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}}
            }}}
        });
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let body = api.operations[0].request_body.as_ref().unwrap();
        let children = body.schema.as_object().unwrap().property("children").unwrap();
        match &children.kind {
            SchemaKind::Array(arr) => assert_eq!(arr.items.as_object().unwrap().properties.len(), 0),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn kind_inference_and_nullable() {
        let def = json!({
            "openapi": "3.1.0",
            "paths": {"/a": {"get": {"parameters": [
                {"name": "mode", "in": "query", "schema": {"enum": [1, 2]}},
                {"name": "note", "in": "query", "schema": {"type": ["string", "null"]}},
                {"name": "ratio", "in": "query", "schema": {"type": "number", "exclusiveMinimum": 0}}
            ]}}}
        });
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let params = &api.operations[0].parameters;
        assert_eq!(params[0].schema.kind.name(), "integer");
        assert!(params[1].schema.nullable);
        match &params[2].schema.kind {
            SchemaKind::Number(c) => {
                assert_eq!(c.minimum, Some(0.0));
                assert!(c.exclusive_minimum);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn operation_parameter_overrides_path_parameter() {
        let def = json!({
            "swagger": "2.0",
            "paths": {"/a/{id}": {
                "parameters": [{"name": "id", "in": "path", "type": "string"}],
                "get": {"parameters": [{"name": "id", "in": "path", "type": "integer"}]}
            }}
        });
        let api = SchemaNormalizer::normalize(&def).unwrap();
        let params = &api.operations[0].parameters;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].schema.kind.name(), "integer");
    }
}
