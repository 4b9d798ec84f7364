//! Concrete request construction
//!
//! Fills a template's slots with baseline values, live values bound from
//! producer responses, and at most one mutated field.

use std::borrow::Cow;
use std::collections::HashMap;

use reqwest::header::HeaderValue;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::RequestBuildError;
use crate::schema::HttpMethod;

use super::{BodyEncoding, FieldLocation, FuzzTemplate};

/// Stand-in for raw bytes while a JSON body is serialized
const RAW_MARKER: &str = "__apifuzz_raw_bytes__";

/// Value placed into a request slot
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    /// Bytes that are not valid UTF-8 and so cannot be a JSON string
    Raw(Vec<u8>),
    /// Leave the slot out of the request entirely
    Absent,
}

impl FieldValue {
    /// Short printable form for logs and reports
    pub fn preview(&self, max_len: usize) -> String {
        let full = match self {
            FieldValue::Json(v) => v.to_string(),
            FieldValue::Raw(bytes) => format!("<raw {} bytes: {:02x?}>", bytes.len(), &bytes[..bytes.len().min(8)]),
            FieldValue::Absent => "<absent>".to_string(),
        };
        truncate_chars(&full, max_len)
    }
}

/// A fully built HTTP request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(serialize_with = "serialize_body")]
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup; the last occurrence wins
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    /// Request body parsed as JSON, if it is JSON
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

fn serialize_body<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match body {
        Some(bytes) => serializer.serialize_some(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Builds concrete requests from a template
pub struct RequestBuilder<'a> {
    template: &'a FuzzTemplate,
    live: Option<&'a HashMap<String, Value>>,
    mutation: Option<(usize, &'a FieldValue)>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(template: &'a FuzzTemplate) -> Self {
        Self {
            template,
            live: None,
            mutation: None,
        }
    }

    /// Live values from producer responses, keyed by field name
    pub fn with_live_values(mut self, live: &'a HashMap<String, Value>) -> Self {
        self.live = Some(live);
        self
    }

    /// Replace the value of the field at `index`
    pub fn with_mutation(mut self, index: usize, value: &'a FieldValue) -> Self {
        self.mutation = Some((index, value));
        self
    }

    fn value_of(&self, index: usize) -> FieldValue {
        if let Some((mutated, value)) = self.mutation {
            if mutated == index {
                return value.clone();
            }
        }
        let field = &self.template.fields[index];
        if !field.descriptor.is_whole_body() {
            if let Some(live) = self.live.and_then(|l| l.get(&field.descriptor.name)) {
                return FieldValue::Json(live.clone());
            }
        }
        FieldValue::Json(field.baseline.clone())
    }

    /// Fails when a header slot holds bytes no header value can carry
    pub fn build(&self) -> Result<HttpRequest, RequestBuildError> {
        let template = self.template;
        let mut path = template.operation.path.clone();
        let mut query: Vec<(String, Vec<u8>)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();

        let mut whole_body = None;
        let mut body_fields: Vec<(String, FieldValue)> = Vec::new();

        for (index, field) in template.fields.iter().enumerate() {
            let name = &field.descriptor.name;
            let value = self.value_of(index);
            match field.descriptor.location {
                FieldLocation::Path => {
                    let segment = match &value {
                        FieldValue::Absent => String::new(),
                        other => encode_path_segment(&slot_bytes(other)),
                    };
                    path = path.replace(&format!("{{{}}}", name), &segment);
                }
                FieldLocation::Query => match &value {
                    FieldValue::Absent => {}
                    FieldValue::Json(Value::Array(items)) => {
                        for item in items {
                            query.push((name.clone(), slot_bytes(&FieldValue::Json(item.clone()))));
                        }
                    }
                    other => query.push((name.clone(), slot_bytes(other))),
                },
                FieldLocation::Header => match &value {
                    FieldValue::Absent => {}
                    other => headers.push((name.clone(), header_value(name, slot_bytes(other))?)),
                },
                FieldLocation::Body if field.descriptor.is_whole_body() => {
                    whole_body = Some((index, value));
                }
                FieldLocation::Body => body_fields.push((name.clone(), value)),
            }
        }

        let mut url = format!("{}{}", template.base_url, path);
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", encode_component(k.as_bytes()), encode_component(v)))
                .collect();
            url.push('?');
            url.push_str(&encoded.join("&"));
        }

        let body = template
            .body_encoding
            .and_then(|encoding| self.encode_body(encoding, whole_body, body_fields));

        let mut request = HttpRequest::new(template.operation.method, url);
        for (name, value) in &template.static_headers {
            if body.is_none() && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            request.headers.push((name.clone(), value.clone()));
        }
        request.headers.extend(headers);
        request.body = body;
        Ok(request)
    }

    fn encode_body(
        &self,
        encoding: BodyEncoding,
        whole_body: Option<(usize, FieldValue)>,
        fields: Vec<(String, FieldValue)>,
    ) -> Option<Vec<u8>> {
        let whole_mutated = matches!(
            (&whole_body, self.mutation),
            (Some((index, _)), Some((mutated, _))) if *index == mutated
        );

        // Start from the whole-body value, then lay individual fields over it
        let root = match whole_body {
            Some((_, FieldValue::Absent)) => return None,
            Some((_, FieldValue::Raw(bytes))) => return Some(bytes),
            Some((_, FieldValue::Json(value))) if whole_mutated || !value.is_object() => {
                return Some(encode_value(encoding, &value, &[]));
            }
            Some((_, FieldValue::Json(Value::Object(map)))) => map,
            Some((_, FieldValue::Json(_))) | None => Map::new(),
        };

        let mut object = root;
        let mut raw = Vec::new();
        for (name, value) in fields {
            match value {
                FieldValue::Absent => {
                    object.remove(&name);
                }
                FieldValue::Json(v) => {
                    object.insert(name, v);
                }
                FieldValue::Raw(bytes) => {
                    object.insert(name.clone(), Value::String(RAW_MARKER.to_string()));
                    raw.push((name, bytes));
                }
            }
        }
        Some(encode_value(encoding, &Value::Object(object), &raw))
    }
}

/// Encode a body, splicing raw byte values in where markers were left
fn encode_value(encoding: BodyEncoding, value: &Value, raw: &[(String, Vec<u8>)]) -> Vec<u8> {
    match encoding {
        BodyEncoding::Json => {
            let mut bytes = value.to_string().into_bytes();
            let marker = format!("\"{}\"", RAW_MARKER);
            for (_, payload) in raw {
                if let Some(pos) = find_subslice(&bytes, marker.as_bytes()) {
                    let mut spliced = Vec::with_capacity(payload.len() + 2);
                    spliced.push(b'"');
                    spliced.extend_from_slice(payload);
                    spliced.push(b'"');
                    bytes.splice(pos..pos + marker.len(), spliced);
                }
            }
            bytes
        }
        BodyEncoding::Form => match value {
            Value::Object(map) => {
                let pairs: Vec<String> = map
                    .iter()
                    .map(|(k, v)| {
                        let bytes = match (v, raw.iter().find(|(name, _)| name == k)) {
                            (Value::String(s), Some((_, payload))) if s == RAW_MARKER => {
                                payload.clone()
                            }
                            _ => slot_bytes(&FieldValue::Json(v.clone())),
                        };
                        format!("{}={}", encode_component(k.as_bytes()), encode_component(&bytes))
                    })
                    .collect();
                pairs.join("&").into_bytes()
            }
            other => slot_bytes(&FieldValue::Json(other.clone())),
        },
    }
}

/// Text form of a value outside a JSON body
fn slot_bytes(value: &FieldValue) -> Vec<u8> {
    match value {
        FieldValue::Json(Value::String(s)) => s.clone().into_bytes(),
        FieldValue::Json(other) => other.to_string().into_bytes(),
        FieldValue::Raw(bytes) => bytes.clone(),
        FieldValue::Absent => Vec::new(),
    }
}

/// Header text for slot bytes, rejected rather than rewritten
fn header_value(name: &str, bytes: Vec<u8>) -> Result<String, RequestBuildError> {
    let invalid = || RequestBuildError::InvalidHeaderValue {
        name: name.to_string(),
    };
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    HeaderValue::from_str(&text).map_err(|_| invalid())?;
    Ok(text)
}

fn encode_component(bytes: &[u8]) -> String {
    url::form_urlencoded::byte_serialize(bytes).collect()
}

fn encode_path_segment(bytes: &[u8]) -> String {
    encode_component(bytes).replace('+', "%20")
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn truncate_chars(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_len).collect();
        out.push_str("...");
        out
    }
}
