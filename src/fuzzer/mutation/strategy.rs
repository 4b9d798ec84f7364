//! Mutation Kinds - Tags for generated deviations
//!
//! Every mutation candidate carries one [`MutationKind`]. Kinds are grouped
//! into three deepness tiers; a fuzz level enables every tier up to and
//! including itself.

use serde::{Deserialize, Serialize};

/// Deepest tier; higher levels saturate here
pub const MAX_LEVEL: u32 = 3;

/// Kinds of deviation a mutation candidate represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    // Level 1: shallow, type and boundary errors
    TypeConfusion,
    NullInjection,
    MissingRequired,
    EmptyValue,
    BoundaryZero,
    BoundaryNegative,
    BoundaryMin,
    BoundaryMax,
    EnumViolation,
    FormatViolation,
    PatternViolation,
    EmptyArray,
    WrongElementType,
    MissingRequiredSubfield,
    AdditionalField,

    // Level 2: length, injection and encoding
    MaxLengthExceeded,
    MinLengthViolation,
    SqlInjection,
    CommandInjection,
    NonUtf8,
    NumericOverflow,
    FloatInInteger,
    MaxItemsExceeded,
    MinItemsViolation,
    EmptyObject,

    // Level 3: oversized payloads and structure corruption
    OversizedString,
    UnicodeAnomaly,
    PathTraversal,
    ExtremeNumber,
    OversizedArray,
    DeepNesting,
    PrototypePollution,
}

impl MutationKind {
    /// Get all kinds, shallow first
    pub fn all() -> Vec<Self> {
        vec![
            Self::TypeConfusion,
            Self::NullInjection,
            Self::MissingRequired,
            Self::EmptyValue,
            Self::BoundaryZero,
            Self::BoundaryNegative,
            Self::BoundaryMin,
            Self::BoundaryMax,
            Self::EnumViolation,
            Self::FormatViolation,
            Self::PatternViolation,
            Self::EmptyArray,
            Self::WrongElementType,
            Self::MissingRequiredSubfield,
            Self::AdditionalField,
            Self::MaxLengthExceeded,
            Self::MinLengthViolation,
            Self::SqlInjection,
            Self::CommandInjection,
            Self::NonUtf8,
            Self::NumericOverflow,
            Self::FloatInInteger,
            Self::MaxItemsExceeded,
            Self::MinItemsViolation,
            Self::EmptyObject,
            Self::OversizedString,
            Self::UnicodeAnomaly,
            Self::PathTraversal,
            Self::ExtremeNumber,
            Self::OversizedArray,
            Self::DeepNesting,
            Self::PrototypePollution,
        ]
    }

    /// Kinds enabled at a deepness level, shallow first
    pub fn for_level(level: u32) -> Vec<Self> {
        let level = level.clamp(1, MAX_LEVEL);
        Self::all()
            .into_iter()
            .filter(|k| k.min_level() <= level)
            .collect()
    }

    /// Lowest level that enables this kind
    pub fn min_level(&self) -> u32 {
        match self {
            Self::TypeConfusion
            | Self::NullInjection
            | Self::MissingRequired
            | Self::EmptyValue
            | Self::BoundaryZero
            | Self::BoundaryNegative
            | Self::BoundaryMin
            | Self::BoundaryMax
            | Self::EnumViolation
            | Self::FormatViolation
            | Self::PatternViolation
            | Self::EmptyArray
            | Self::WrongElementType
            | Self::MissingRequiredSubfield
            | Self::AdditionalField => 1,

            Self::MaxLengthExceeded
            | Self::MinLengthViolation
            | Self::SqlInjection
            | Self::CommandInjection
            | Self::NonUtf8
            | Self::NumericOverflow
            | Self::FloatInInteger
            | Self::MaxItemsExceeded
            | Self::MinItemsViolation
            | Self::EmptyObject => 2,

            Self::OversizedString
            | Self::UnicodeAnomaly
            | Self::PathTraversal
            | Self::ExtremeNumber
            | Self::OversizedArray
            | Self::DeepNesting
            | Self::PrototypePollution => 3,
        }
    }

    /// Category for this kind
    pub fn category(&self) -> MutationCategory {
        match self {
            Self::TypeConfusion | Self::NullInjection | Self::FloatInInteger => {
                MutationCategory::Type
            }

            Self::BoundaryZero
            | Self::BoundaryNegative
            | Self::BoundaryMin
            | Self::BoundaryMax
            | Self::NumericOverflow
            | Self::ExtremeNumber
            | Self::MaxLengthExceeded
            | Self::MinLengthViolation
            | Self::MaxItemsExceeded
            | Self::MinItemsViolation => MutationCategory::Boundary,

            Self::MissingRequired
            | Self::EmptyValue
            | Self::EnumViolation
            | Self::FormatViolation
            | Self::PatternViolation
            | Self::EmptyArray
            | Self::WrongElementType
            | Self::MissingRequiredSubfield
            | Self::AdditionalField
            | Self::EmptyObject => MutationCategory::Structure,

            Self::SqlInjection
            | Self::CommandInjection
            | Self::PathTraversal
            | Self::PrototypePollution => MutationCategory::Injection,

            Self::NonUtf8 | Self::UnicodeAnomaly => MutationCategory::Encoding,

            Self::OversizedString | Self::OversizedArray | Self::DeepNesting => {
                MutationCategory::Size
            }
        }
    }

    /// Encoding or size abuse a server may legitimately refuse to parse
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::NonUtf8 | Self::OversizedString | Self::OversizedArray | Self::DeepNesting
        )
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeConfusion => "type-confusion",
            Self::NullInjection => "null-injection",
            Self::MissingRequired => "missing-required",
            Self::EmptyValue => "empty-value",
            Self::BoundaryZero => "boundary-zero",
            Self::BoundaryNegative => "boundary-negative",
            Self::BoundaryMin => "boundary-min",
            Self::BoundaryMax => "boundary-max",
            Self::EnumViolation => "enum-violation",
            Self::FormatViolation => "format-violation",
            Self::PatternViolation => "pattern-violation",
            Self::EmptyArray => "empty-array",
            Self::WrongElementType => "wrong-element-type",
            Self::MissingRequiredSubfield => "missing-required-subfield",
            Self::AdditionalField => "additional-field",
            Self::MaxLengthExceeded => "max-length-exceeded",
            Self::MinLengthViolation => "min-length-violation",
            Self::SqlInjection => "sql-injection",
            Self::CommandInjection => "command-injection",
            Self::NonUtf8 => "non-utf8",
            Self::NumericOverflow => "numeric-overflow",
            Self::FloatInInteger => "float-in-integer",
            Self::MaxItemsExceeded => "max-items-exceeded",
            Self::MinItemsViolation => "min-items-violation",
            Self::EmptyObject => "empty-object",
            Self::OversizedString => "oversized-string",
            Self::UnicodeAnomaly => "unicode-anomaly",
            Self::PathTraversal => "path-traversal",
            Self::ExtremeNumber => "extreme-number",
            Self::OversizedArray => "oversized-array",
            Self::DeepNesting => "deep-nesting",
            Self::PrototypePollution => "prototype-pollution",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of mutation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationCategory {
    /// Wrong JSON type in a slot
    Type,
    /// Values at or past declared bounds
    Boundary,
    /// Missing, extra or malformed structure
    Structure,
    /// Injection-shaped payloads
    Injection,
    /// Byte-level and unicode encoding edge cases
    Encoding,
    /// Oversized and deeply nested payloads
    Size,
}

impl MutationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Boundary => "boundary",
            Self::Structure => "structure",
            Self::Injection => "injection",
            Self::Encoding => "encoding",
            Self::Size => "size",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds() {
        let all = MutationKind::all();
        assert_eq!(all.len(), 32);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }

    #[test]
    fn levels_are_nested() {
        let one = MutationKind::for_level(1);
        let two = MutationKind::for_level(2);
        let three = MutationKind::for_level(3);
        assert_eq!(one.len(), 15);
        assert_eq!(two.len(), 25);
        assert_eq!(three.len(), 32);
        assert!(two.starts_with(&one));
        assert!(three.starts_with(&two));
    }

    #[test]
    fn levels_saturate() {
        assert_eq!(MutationKind::for_level(7), MutationKind::for_level(3));
        assert_eq!(MutationKind::for_level(0), MutationKind::for_level(1));
    }

    #[test]
    fn every_kind_has_a_category() {
        let categories: std::collections::HashSet<&str> = MutationKind::all()
            .iter()
            .map(|k| k.category().as_str())
            .collect();
        assert_eq!(categories.len(), 6);
    }

    #[test]
    fn tags_are_kebab_case() {
        assert_eq!(MutationKind::BoundaryNegative.to_string(), "boundary-negative");
        assert_eq!(
            serde_json::to_value(MutationKind::NonUtf8).unwrap(),
            serde_json::json!("non-utf8")
        );
    }

    #[test]
    fn malformed_kinds() {
        assert!(MutationKind::DeepNesting.is_malformed());
        assert!(!MutationKind::SqlInjection.is_malformed());
        assert_eq!(MutationKind::NonUtf8.category(), MutationCategory::Encoding);
        assert_eq!(MutationKind::OversizedArray.category(), MutationCategory::Size);
    }
}
