//! Mutation Module - Schema-driven mutation candidates
//!
//! The [`MutationRegistry`] maps a field's schema kind to a lazy, finite
//! sequence of [`MutationCandidate`]s. The sequence for level N always
//! starts with the full sequence for level N-1, and every value is a pure
//! function of (seed, field, kind).

pub mod dictionary;
pub mod json;
pub mod strategy;

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use regex::Regex;
use serde_json::{json, Value};

use crate::schema::{NumericConstraints, SchemaKind, StringConstraints};
use crate::template::{FieldLocation, FieldValue, FuzzTemplate, MutableField};

use self::dictionary::{Dictionary, TokenCategory};
use self::json::JsonMutator;
use self::strategy::{MutationKind, MAX_LEVEL};

pub use self::strategy::MutationCategory;

/// Injection payloads drawn per kind before the deepest level
const INJECTION_SAMPLE: usize = 3;
const OVERSIZED_STRING_LEN: usize = 65_536;
const OVERSIZED_ARRAY_LEN: usize = 10_000;
const NESTING_DEPTH: usize = 256;
/// Cap for sizes derived from declared length and item bounds
const MAX_EXCEEDED_LEN: u64 = 1_000_000;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// One generated deviant value for one field
#[derive(Debug, Clone, PartialEq)]
pub struct MutationCandidate {
    /// Index of the field in its template
    pub field: usize,
    pub location: FieldLocation,
    pub name: String,
    pub kind: MutationKind,
    pub value: FieldValue,
}

/// Which slice of a kind's values to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
    Core,
    /// Dictionary remainder, appended at the deepest level
    Extended,
}

/// Produces mutation candidates for template fields
#[derive(Debug, Clone)]
pub struct MutationRegistry {
    dictionary: Dictionary,
    seed: u64,
}

impl MutationRegistry {
    pub fn new(seed: u64) -> Self {
        Self {
            dictionary: Dictionary::http_default(),
            seed,
        }
    }

    /// Lazy candidates for one field of a template
    pub fn candidates<'a>(
        &'a self,
        template: &'a FuzzTemplate,
        field_index: usize,
        level: u32,
    ) -> Candidates<'a> {
        let level = level.clamp(1, MAX_LEVEL);
        let mut plan: Vec<(MutationKind, Phase)> = MutationKind::for_level(level)
            .into_iter()
            .map(|k| (k, Phase::Core))
            .collect();
        if level == MAX_LEVEL {
            plan.push((MutationKind::SqlInjection, Phase::Extended));
            plan.push((MutationKind::CommandInjection, Phase::Extended));
        }

        Candidates {
            registry: self,
            field_key: format!(
                "{} {}",
                template.identity(),
                template.fields[field_index].descriptor.slot()
            ),
            field: &template.fields[field_index],
            field_index,
            plan: plan.into(),
            pending: VecDeque::new(),
            current: None,
        }
    }

    /// All candidates of a template, field by field
    pub fn template_candidates<'a>(
        &'a self,
        template: &'a FuzzTemplate,
        level: u32,
    ) -> impl Iterator<Item = MutationCandidate> + 'a {
        (0..template.fields.len()).flat_map(move |i| self.candidates(template, i, level))
    }

    /// Phase-independent, so core and extended draws partition one shuffle
    fn rng_for(&self, field_key: &str, kind: MutationKind) -> SmallRng {
        let key = self
            .seed
            .to_le_bytes()
            .into_iter()
            .chain(field_key.bytes())
            .chain([0xff])
            .chain(kind.as_str().bytes());
        SmallRng::seed_from_u64(fnv1a(key))
    }

    fn generate(
        &self,
        field_key: &str,
        field: &MutableField,
        kind: MutationKind,
        phase: Phase,
    ) -> Vec<FieldValue> {
        let descriptor = &field.descriptor;
        let schema = &descriptor.schema;
        let baseline = &field.baseline;

        // Kinds that apply regardless of schema kind
        match kind {
            MutationKind::NullInjection => {
                return if schema.nullable {
                    vec![]
                } else {
                    vec![FieldValue::Json(Value::Null)]
                };
            }
            MutationKind::MissingRequired => {
                return if descriptor.required {
                    vec![FieldValue::Absent]
                } else {
                    vec![]
                };
            }
            MutationKind::EnumViolation => {
                return match schema.enum_values.as_deref() {
                    Some(values) if !values.is_empty() => {
                        enum_violation(values).map(FieldValue::Json).into_iter().collect()
                    }
                    _ => vec![],
                };
            }
            MutationKind::TypeConfusion => {
                return JsonMutator::type_confused(&schema.kind)
                    .into_iter()
                    .map(FieldValue::Json)
                    .collect();
            }
            _ => {}
        }

        let values = match &schema.kind {
            SchemaKind::String(c) => self.string_values(field_key, c, baseline, kind, phase),
            SchemaKind::Integer(c) => integer_values(c, kind),
            SchemaKind::Number(c) => number_values(c, kind),
            SchemaKind::Boolean => match kind {
                MutationKind::EmptyValue => vec![json!("")],
                _ => vec![],
            },
            SchemaKind::Array(arr) => {
                let item = arr
                    .items
                    .default
                    .clone()
                    .or_else(|| baseline.as_array().and_then(|a| a.first()).cloned())
                    .unwrap_or(Value::Null);
                match kind {
                    MutationKind::EmptyArray => vec![json!([])],
                    MutationKind::WrongElementType => {
                        vec![json!([JsonMutator::wrong_element(&arr.items)])]
                    }
                    MutationKind::MaxItemsExceeded => arr
                        .max_items
                        .and_then(exceeded_len)
                        .map(|len| JsonMutator::repeated(&item, len))
                        .into_iter()
                        .collect(),
                    MutationKind::MinItemsViolation => arr
                        .min_items
                        .and_then(short_len)
                        .map(|len| JsonMutator::repeated(&item, len))
                        .into_iter()
                        .collect(),
                    MutationKind::OversizedArray => {
                        vec![JsonMutator::repeated(&item, OVERSIZED_ARRAY_LEN)]
                    }
                    MutationKind::DeepNesting => vec![JsonMutator::deep_nest(NESTING_DEPTH, true)],
                    _ => vec![],
                }
            }
            SchemaKind::Object(obj) => match kind {
                MutationKind::MissingRequiredSubfield => obj
                    .required
                    .iter()
                    .filter(|name| baseline.get(name.as_str()).is_some())
                    .map(|name| JsonMutator::without_field(baseline, name))
                    .collect(),
                MutationKind::AdditionalField => vec![JsonMutator::with_field(
                    baseline,
                    "apifuzz_undeclared",
                    json!("unexpected"),
                )],
                MutationKind::EmptyObject => vec![json!({})],
                MutationKind::DeepNesting => vec![JsonMutator::deep_nest(NESTING_DEPTH, false)],
                MutationKind::PrototypePollution => vec![
                    JsonMutator::with_field(baseline, "__proto__", json!({"polluted": true})),
                    JsonMutator::with_field(
                        baseline,
                        "constructor",
                        json!({"prototype": {"polluted": true}}),
                    ),
                ],
                _ => vec![],
            },
        };

        if kind == MutationKind::NonUtf8 && matches!(schema.kind, SchemaKind::String(_)) {
            return vec![FieldValue::Raw(vec![0xc3, 0x28, 0xa0, 0xa1, 0xff, 0xfe])];
        }
        values.into_iter().map(FieldValue::Json).collect()
    }

    fn string_values(
        &self,
        field_key: &str,
        c: &StringConstraints,
        baseline: &Value,
        kind: MutationKind,
        phase: Phase,
    ) -> Vec<Value> {
        let sampled = |category: TokenCategory| {
            let mut rng = self.rng_for(field_key, kind);
            let (head, rest) = self
                .dictionary
                .split_sample(category, INJECTION_SAMPLE, &mut rng);
            let tokens = match phase {
                Phase::Core => head,
                Phase::Extended => rest,
            };
            tokens.into_iter().map(Value::String).collect::<Vec<_>>()
        };

        match kind {
            MutationKind::EmptyValue if baseline.as_str() != Some("") => vec![json!("")],
            MutationKind::FormatViolation => c
                .format
                .as_deref()
                .map(|f| json!(format_violation(f)))
                .into_iter()
                .collect(),
            MutationKind::PatternViolation => c
                .pattern
                .as_deref()
                .and_then(pattern_violation)
                .map(Value::String)
                .into_iter()
                .collect(),
            MutationKind::MaxLengthExceeded => c
                .max_length
                .and_then(exceeded_len)
                .map(|len| json!("a".repeat(len)))
                .into_iter()
                .collect(),
            MutationKind::MinLengthViolation => c
                .min_length
                .and_then(short_len)
                .map(|len| json!("a".repeat(len)))
                .into_iter()
                .collect(),
            MutationKind::SqlInjection => sampled(TokenCategory::SqlInjection),
            MutationKind::CommandInjection => sampled(TokenCategory::CommandInjection),
            MutationKind::OversizedString => vec![json!("A".repeat(OVERSIZED_STRING_LEN))],
            MutationKind::UnicodeAnomaly => {
                let mut rng = self.rng_for(field_key, kind);
                let text = JsonMutator::text_of(baseline);
                self.dictionary
                    .tokens_in(TokenCategory::Unicode)
                    .iter()
                    .map(|token| json!(JsonMutator::unicode_inject(&text, token, &mut rng)))
                    .collect()
            }
            MutationKind::PathTraversal => self
                .dictionary
                .tokens_in(TokenCategory::PathTraversal)
                .iter()
                .map(|t| json!(t))
                .collect(),
            _ => vec![],
        }
    }
}

fn integer_values(c: &NumericConstraints, kind: MutationKind) -> Vec<Value> {
    match kind {
        MutationKind::EmptyValue => vec![json!("")],
        MutationKind::BoundaryZero => vec![json!(0)],
        MutationKind::BoundaryNegative => match c.minimum {
            // A declared non-positive minimum is covered by boundary-min
            Some(min) if min <= 0.0 => vec![],
            _ => vec![json!(-1)],
        },
        MutationKind::BoundaryMin => c
            .minimum
            .and_then(|min| {
                if c.exclusive_minimum {
                    Some(min.floor() as i128)
                } else {
                    (min.ceil() as i128).checked_sub(1)
                }
            })
            .and_then(integer_json)
            .into_iter()
            .collect(),
        MutationKind::BoundaryMax => c
            .maximum
            .and_then(|max| {
                if c.exclusive_maximum {
                    Some(max.ceil() as i128)
                } else {
                    (max.floor() as i128).checked_add(1)
                }
            })
            .and_then(integer_json)
            .into_iter()
            .collect(),
        MutationKind::NumericOverflow => match c.format.as_deref() {
            Some("int32") => vec![json!(2_147_483_648_i64), json!(-2_147_483_649_i64)],
            _ => vec![json!(9_223_372_036_854_775_808_u64)],
        },
        MutationKind::FloatInInteger => vec![json!(1.5)],
        MutationKind::ExtremeNumber => vec![json!(1e308), json!(-1e308), json!(i64::MIN)],
        _ => vec![],
    }
}

/// A JSON integer for `value`, or `None` when neither i64 nor u64 holds it
/// 64-bit FNV-1a, stable across Rust releases
fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u64 {
    bytes
        .into_iter()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

fn integer_json(value: i128) -> Option<Value> {
    i64::try_from(value)
        .map(Value::from)
        .or_else(|_| u64::try_from(value).map(Value::from))
        .ok()
}

/// Length one past a declared maximum, skipped when above the cap
fn exceeded_len(max: u64) -> Option<usize> {
    max.checked_add(1)
        .filter(|len| *len <= MAX_EXCEEDED_LEN)
        .map(|len| len as usize)
}

/// Length one short of a declared minimum, at most the cap
fn short_len(min: u64) -> Option<usize> {
    min.checked_sub(1).map(|len| len.min(MAX_EXCEEDED_LEN) as usize)
}

fn number_values(c: &NumericConstraints, kind: MutationKind) -> Vec<Value> {
    match kind {
        MutationKind::EmptyValue => vec![json!("")],
        MutationKind::BoundaryZero => vec![json!(0.0)],
        MutationKind::BoundaryNegative => match c.minimum {
            Some(min) if min <= 0.0 => vec![],
            _ => vec![json!(-1.0)],
        },
        MutationKind::BoundaryMin => c
            .minimum
            .map(|min| if c.exclusive_minimum { json!(min) } else { json!(min - 1.0) })
            .into_iter()
            .collect(),
        MutationKind::BoundaryMax => c
            .maximum
            .map(|max| if c.exclusive_maximum { json!(max) } else { json!(max + 1.0) })
            .into_iter()
            .collect(),
        MutationKind::NumericOverflow if c.format.as_deref() == Some("float") => {
            vec![json!(3.5e38)]
        }
        MutationKind::ExtremeNumber => vec![json!(1e308), json!(-1e308), json!(5e-324)],
        _ => vec![],
    }
}

/// A value of the enum's kind that is not one of its members
fn enum_violation(values: &[Value]) -> Option<Value> {
    let candidate = match values.first()? {
        Value::Number(_) => {
            let max = values.iter().filter_map(Value::as_i64).max().unwrap_or(0);
            json!(max.saturating_add(1))
        }
        Value::Bool(_) => json!("neither"),
        other => json!(format!("{}_invalid", JsonMutator::text_of(other))),
    };
    (!values.contains(&candidate)).then_some(candidate)
}

fn format_violation(format: &str) -> String {
    match format {
        "date" => "2024-13-45".to_string(),
        "date-time" => "not-a-date-time".to_string(),
        "time" => "25:61:61".to_string(),
        "uuid" => "not-a-uuid".to_string(),
        "email" => "not-an-email".to_string(),
        "uri" | "url" | "uri-reference" => "ht!tp://not a uri".to_string(),
        "hostname" => "-invalid-.host_name".to_string(),
        "ipv4" => "999.999.999.999".to_string(),
        "ipv6" => "::g::".to_string(),
        "byte" => "!!!not-base64!!!".to_string(),
        other => format!("%%not-{}%%", other),
    }
}

/// First probe string the pattern rejects
fn pattern_violation(pattern: &str) -> Option<String> {
    let Ok(re) = Regex::new(pattern) else {
        return Some("!@#$%^&*()".to_string());
    };
    ["", "!@#$%^&*()", " ", "0", "a", "\u{0000}"]
        .into_iter()
        .find(|probe| !re.is_match(probe))
        .map(str::to_string)
}

/// Lazy candidate sequence for one field
pub struct Candidates<'a> {
    registry: &'a MutationRegistry,
    field_key: String,
    field: &'a MutableField,
    field_index: usize,
    plan: VecDeque<(MutationKind, Phase)>,
    pending: VecDeque<FieldValue>,
    current: Option<MutationKind>,
}

impl Iterator for Candidates<'_> {
    type Item = MutationCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let (Some(value), Some(kind)) = (self.pending.pop_front(), self.current) {
                return Some(MutationCandidate {
                    field: self.field_index,
                    location: self.field.descriptor.location,
                    name: self.field.descriptor.name.clone(),
                    kind,
                    value,
                });
            }
            let (kind, phase) = self.plan.pop_front()?;
            self.current = Some(kind);
            self.pending = self
                .registry
                .generate(&self.field_key, self.field, kind, phase)
                .into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArraySchema, ObjectSchema, Schema};
    use crate::template::compiler::baseline_value;
    use crate::template::FieldDescriptor;

    fn template_with(schema: Schema, location: FieldLocation, required: bool) -> FuzzTemplate {
        let baseline = baseline_value(&schema);
        FuzzTemplate {
            operation: crate::schema::Operation {
                method: crate::schema::HttpMethod::Get,
                path: "/t".to_string(),
                operation_id: None,
                parameters: vec![],
                request_body: None,
                responses: vec![],
            },
            base_url: "http://localhost".to_string(),
            fields: vec![MutableField {
                descriptor: FieldDescriptor {
                    name: "f".to_string(),
                    location,
                    schema,
                    required,
                },
                baseline,
            }],
            static_headers: vec![],
            body_encoding: None,
            expectations: vec![],
            response_fields: vec![],
        }
    }

    fn kinds(registry: &MutationRegistry, template: &FuzzTemplate, level: u32) -> Vec<MutationKind> {
        registry.candidates(template, 0, level).map(|c| c.kind).collect()
    }

    #[test]
    fn unconstrained_integer_level_one() {
        let registry = MutationRegistry::new(1);
        let t = template_with(Schema::integer(), FieldLocation::Path, true);
        let candidates: Vec<_> = registry.candidates(&t, 0, 1).collect();
        let tags: Vec<&str> = candidates.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "type-confusion",
                "null-injection",
                "missing-required",
                "empty-value",
                "boundary-zero",
                "boundary-negative"
            ]
        );
        let negative = candidates
            .iter()
            .find(|c| c.kind == MutationKind::BoundaryNegative)
            .unwrap();
        assert_eq!(negative.value, FieldValue::Json(json!(-1)));
    }

    #[test]
    fn bounded_integer() {
        let registry = MutationRegistry::new(1);
        let mut schema = Schema::integer();
        schema.kind = SchemaKind::Integer(NumericConstraints {
            minimum: Some(0.0),
            maximum: Some(100.0),
            ..Default::default()
        });
        let t = template_with(schema, FieldLocation::Query, false);
        let candidates: Vec<_> = registry.candidates(&t, 0, 1).collect();
        let value_of = |kind| {
            candidates
                .iter()
                .find(|c| c.kind == kind)
                .map(|c| c.value.clone())
        };
        assert_eq!(value_of(MutationKind::BoundaryMin), Some(FieldValue::Json(json!(-1))));
        assert_eq!(value_of(MutationKind::BoundaryMax), Some(FieldValue::Json(json!(101))));
        assert_eq!(value_of(MutationKind::BoundaryNegative), None);
        assert_eq!(value_of(MutationKind::MissingRequired), None);
    }

    #[test]
    fn field_seeds_use_fnv1a() {
        assert_eq!(fnv1a(*b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(*b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(*b"foobar"), 0x8594_4171_f739_67e8);

        use rand::Rng;
        let registry = MutationRegistry::new(42);
        let draw = |key: &str, kind| registry.rng_for(key, kind).gen::<u64>();
        assert_eq!(
            draw("GET /a query:q", MutationKind::SqlInjection),
            draw("GET /a query:q", MutationKind::SqlInjection)
        );
        assert_ne!(
            draw("GET /a query:q", MutationKind::SqlInjection),
            draw("GET /a query:q", MutationKind::CommandInjection)
        );
    }

    fn integer_field(constraints: NumericConstraints) -> FuzzTemplate {
        let mut schema = Schema::integer();
        schema.kind = SchemaKind::Integer(constraints);
        template_with(schema, FieldLocation::Query, false)
    }

    fn value_of(t: &FuzzTemplate, level: u32, kind: MutationKind) -> Option<FieldValue> {
        MutationRegistry::new(1)
            .candidates(t, 0, level)
            .find(|c| c.kind == kind)
            .map(|c| c.value)
    }

    #[test]
    fn boundaries_at_int64_limits() {
        let top = integer_field(NumericConstraints {
            maximum: Some(9_223_372_036_854_775_807_i64 as f64),
            ..Default::default()
        });
        // The declared maximum parses to 2^63, so the next integer needs u64
        assert_eq!(
            value_of(&top, 1, MutationKind::BoundaryMax),
            Some(FieldValue::Json(json!(9_223_372_036_854_775_809_u64)))
        );

        let bottom = integer_field(NumericConstraints {
            minimum: Some(i64::MIN as f64),
            ..Default::default()
        });
        assert_eq!(value_of(&bottom, 1, MutationKind::BoundaryMin), None);
        assert!(MutationRegistry::new(1).candidates(&bottom, 0, 3).count() > 0);

        let exclusive = integer_field(NumericConstraints {
            minimum: Some(i64::MIN as f64),
            exclusive_minimum: true,
            ..Default::default()
        });
        assert_eq!(
            value_of(&exclusive, 1, MutationKind::BoundaryMin),
            Some(FieldValue::Json(json!(i64::MIN)))
        );

        let beyond = integer_field(NumericConstraints {
            maximum: Some(1e300),
            ..Default::default()
        });
        assert_eq!(value_of(&beyond, 1, MutationKind::BoundaryMax), None);
    }

    #[test]
    fn length_bounds_are_capped() {
        let mut schema = Schema::string();
        schema.kind = SchemaKind::String(StringConstraints {
            min_length: Some(u64::MAX),
            max_length: Some(u64::MAX),
            ..Default::default()
        });
        let t = template_with(schema, FieldLocation::Body, true);
        assert_eq!(value_of(&t, 2, MutationKind::MaxLengthExceeded), None);
        match value_of(&t, 2, MutationKind::MinLengthViolation) {
            Some(FieldValue::Json(Value::String(s))) => {
                assert_eq!(s.len() as u64, MAX_EXCEEDED_LEN)
            }
            other => panic!("expected a capped string, got {:?}", other),
        }

        let array = Schema::new(SchemaKind::Array(ArraySchema {
            items: Box::new(Schema::string()),
            min_items: Some(5_000_000_000),
            max_items: Some(u64::MAX),
        }));
        let t = template_with(array, FieldLocation::Body, false);
        assert_eq!(value_of(&t, 2, MutationKind::MaxItemsExceeded), None);
        match value_of(&t, 2, MutationKind::MinItemsViolation) {
            Some(FieldValue::Json(Value::Array(items))) => {
                assert_eq!(items.len() as u64, MAX_EXCEEDED_LEN)
            }
            other => panic!("expected a capped array, got {:?}", other),
        }
    }

    #[test]
    fn string_policies() {
        let registry = MutationRegistry::new(1);
        let mut schema = Schema::string();
        schema.kind = SchemaKind::String(StringConstraints {
            max_length: Some(4),
            format: Some("email".to_string()),
            ..Default::default()
        });
        let t = template_with(schema, FieldLocation::Body, true);
        let candidates: Vec<_> = registry.candidates(&t, 0, 2).collect();

        let has = |kind| candidates.iter().any(|c| c.kind == kind);
        assert!(has(MutationKind::EmptyValue));
        assert!(has(MutationKind::FormatViolation));
        assert!(has(MutationKind::SqlInjection));
        assert!(has(MutationKind::CommandInjection));
        assert!(!has(MutationKind::OversizedString));

        let too_long = candidates
            .iter()
            .find(|c| c.kind == MutationKind::MaxLengthExceeded)
            .unwrap();
        assert_eq!(too_long.value, FieldValue::Json(json!("aaaaa")));

        let raw = candidates.iter().find(|c| c.kind == MutationKind::NonUtf8).unwrap();
        match &raw.value {
            FieldValue::Raw(bytes) => assert!(std::str::from_utf8(bytes).is_err()),
            other => panic!("expected raw bytes, got {:?}", other),
        }
    }

    #[test]
    fn pattern_violation_does_not_match() {
        let probe = pattern_violation("^[a-z]+$").unwrap();
        assert!(!Regex::new("^[a-z]+$").unwrap().is_match(&probe));
    }

    #[test]
    fn array_and_object_policies() {
        let registry = MutationRegistry::new(1);
        let array = Schema::new(SchemaKind::Array(ArraySchema {
            items: Box::new(Schema::string()),
            min_items: Some(2),
            max_items: Some(3),
        }));
        let t = template_with(array, FieldLocation::Body, false);
        let candidates: Vec<_> = registry.candidates(&t, 0, 2).collect();
        let value = |kind| {
            candidates
                .iter()
                .find(|c| c.kind == kind)
                .map(|c| c.value.clone())
        };
        assert_eq!(value(MutationKind::EmptyArray), Some(FieldValue::Json(json!([]))));
        assert_eq!(value(MutationKind::WrongElementType), Some(FieldValue::Json(json!([123]))));
        assert_eq!(
            value(MutationKind::MaxItemsExceeded),
            Some(FieldValue::Json(json!(["a", "a", "a", "a"])))
        );
        assert_eq!(value(MutationKind::MinItemsViolation), Some(FieldValue::Json(json!(["a"]))));

        let object = Schema::new(SchemaKind::Object(ObjectSchema {
            properties: vec![
                ("id".to_string(), Schema::integer()),
                ("name".to_string(), Schema::string()),
            ],
            required: vec!["id".to_string(), "name".to_string()],
        }));
        let t = template_with(object, FieldLocation::Body, true);
        let subfields: Vec<_> = registry
            .candidates(&t, 0, 1)
            .filter(|c| c.kind == MutationKind::MissingRequiredSubfield)
            .map(|c| c.value)
            .collect();
        assert_eq!(
            subfields,
            vec![
                FieldValue::Json(json!({"name": "a"})),
                FieldValue::Json(json!({"id": 1}))
            ]
        );
    }

    #[test]
    fn levels_are_monotonic_prefixes() {
        let registry = MutationRegistry::new(99);
        let mut schema = Schema::string();
        schema.kind = SchemaKind::String(StringConstraints {
            min_length: Some(2),
            max_length: Some(10),
            pattern: Some("^[a-z]+$".to_string()),
            format: Some("uuid".to_string()),
        });
        let t = template_with(schema, FieldLocation::Query, true);
        let runs: Vec<Vec<MutationCandidate>> =
            (1..=4).map(|l| registry.candidates(&t, 0, l).collect()).collect();
        for pair in runs.windows(2) {
            assert!(pair[1].len() >= pair[0].len());
            assert_eq!(&pair[1][..pair[0].len()], &pair[0][..]);
        }
        assert!(runs[1].len() > runs[0].len());
        assert!(runs[2].len() > runs[1].len());
        assert_eq!(runs[3], runs[2]);
    }

    #[test]
    fn extended_injections_complete_the_dictionary() {
        let registry = MutationRegistry::new(5);
        let t = template_with(Schema::string(), FieldLocation::Query, false);
        let sql: Vec<_> = registry
            .candidates(&t, 0, 3)
            .filter(|c| c.kind == MutationKind::SqlInjection)
            .collect();
        assert_eq!(
            sql.len(),
            Dictionary::http_default()
                .tokens_in(TokenCategory::SqlInjection)
                .len()
        );
    }

    #[test]
    fn candidates_are_deterministic_per_seed() {
        let t = template_with(Schema::string(), FieldLocation::Query, true);
        let a: Vec<_> = MutationRegistry::new(42).candidates(&t, 0, 3).collect();
        let b: Vec<_> = MutationRegistry::new(42).candidates(&t, 0, 3).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn nullable_fields_skip_null_injection() {
        let registry = MutationRegistry::new(1);
        let mut schema = Schema::string();
        schema.nullable = true;
        let t = template_with(schema, FieldLocation::Query, false);
        assert!(!kinds(&registry, &t, 1).contains(&MutationKind::NullInjection));
    }

    #[test]
    fn enum_violation_is_outside_the_enum() {
        assert_eq!(enum_violation(&[json!("a"), json!("b")]), Some(json!("a_invalid")));
        assert_eq!(enum_violation(&[json!(1), json!(5)]), Some(json!(6)));
        assert_eq!(enum_violation(&[json!(true)]), Some(json!("neither")));
    }
}
