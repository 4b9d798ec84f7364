//! Error taxonomy with miette diagnostics
//!
//! Schema-level errors are run-fatal and surface before any request is
//! sent. Template compile errors are local to one operation unless they
//! concern the base URL. Network and protocol errors never abort a run;
//! they become findings.

use miette::Diagnostic;
use thiserror::Error;

/// Malformed or unsupported API definition
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SchemaError {
    /// A structural key the definition must carry is absent
    #[error("missing required key '{key}' in {context}")]
    #[diagnostic(
        code(apifuzz::schema::missing_key),
        help("The API definition must be a Swagger 2.0 or OpenAPI 3.x document")
    )]
    MissingKey { key: String, context: String },

    /// A declared schema `type` outside the supported set
    #[error("unrecognized schema kind '{kind}' in {context}")]
    #[diagnostic(
        code(apifuzz::schema::unknown_kind),
        help("Supported kinds: string, integer, number, boolean, array, object, file")
    )]
    UnknownKind { kind: String, context: String },

    /// A `$ref` that does not point into the document
    #[error("unresolved reference '{reference}'")]
    #[diagnostic(
        code(apifuzz::schema::unresolved_ref),
        help("Only local references of the form '#/...' are supported")
    )]
    UnresolvedReference { reference: String },

    /// A `{placeholder}` in a path with no matching path parameter
    #[error("path '{path}' uses '{{{name}}}' but declares no such path parameter")]
    #[diagnostic(code(apifuzz::schema::undeclared_path_parameter))]
    UndeclaredPathParameter { path: String, name: String },

    /// The document is not shaped like an API definition at all
    #[error("invalid API definition: {0}")]
    #[diagnostic(code(apifuzz::schema::invalid))]
    InvalidDocument(String),
}

impl SchemaError {
    pub fn missing(key: impl Into<String>, context: impl Into<String>) -> Self {
        SchemaError::MissingKey {
            key: key.into(),
            context: context.into(),
        }
    }
}

/// An operation that cannot be turned into a safe fuzz template
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum TemplateCompileError {
    /// Parameter location outside path/query/header/body
    #[error("{operation}: parameter '{name}' has unsupported location '{location}'")]
    #[diagnostic(code(apifuzz::template::invalid_location))]
    InvalidLocation {
        operation: String,
        name: String,
        location: String,
    },

    /// A required enum with nothing to choose from
    #[error("{operation}: required parameter '{name}' declares an empty enum")]
    #[diagnostic(code(apifuzz::template::empty_enum))]
    EmptyEnum { operation: String, name: String },

    /// Constraints no value can satisfy (e.g. minimum above maximum)
    #[error("{operation}: parameter '{name}' has unsatisfiable constraints: {detail}")]
    #[diagnostic(code(apifuzz::template::unsatisfiable))]
    UnsatisfiableConstraints {
        operation: String,
        name: String,
        detail: String,
    },

    /// Neither the definition nor the operator supplied a usable base URL
    #[error("cannot resolve a base URL: {detail}")]
    #[diagnostic(
        code(apifuzz::template::base_url),
        help("Pass the target explicitly with --url http://host:port")
    )]
    UnresolvableBaseUrl { detail: String },
}

impl TemplateCompileError {
    /// Identity of the operation this error belongs to, if any
    pub fn operation(&self) -> Option<&str> {
        match self {
            TemplateCompileError::InvalidLocation { operation, .. }
            | TemplateCompileError::EmptyEnum { operation, .. }
            | TemplateCompileError::UnsatisfiableConstraints { operation, .. } => {
                Some(operation)
            }
            TemplateCompileError::UnresolvableBaseUrl { .. } => None,
        }
    }
}

/// A request whose slots cannot all be put on the wire
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum RequestBuildError {
    /// Header bytes that are not UTF-8 or that a header value cannot carry
    #[error("value for header '{name}' is not a valid header value")]
    #[diagnostic(code(apifuzz::request::invalid_header))]
    InvalidHeaderValue { name: String },
}

/// Top-level error type for a fuzzing run
#[derive(Error, Debug, Diagnostic)]
pub enum ApiFuzzError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    TemplateCompile(#[from] TemplateCompileError),

    /// Connection refused/reset that persisted through the retry
    #[error("transient network error: {message}")]
    #[diagnostic(code(apifuzz::network::transient))]
    TransientNetwork { message: String },

    /// A response that violates a structural expectation
    #[error("target protocol violation: {message}")]
    #[diagnostic(code(apifuzz::target::protocol_violation))]
    TargetProtocolViolation { message: String },

    /// The API definition could not be loaded
    #[error("cannot load API definition from {source_name}: {message}")]
    #[diagnostic(
        code(apifuzz::definition::load),
        help("Only JSON definitions are supported; check the path or URL")
    )]
    DefinitionSource {
        source_name: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(apifuzz::io))]
    Io(#[from] std::io::Error),
}

impl ApiFuzzError {
    /// Whether this error must stop the run
    pub fn is_run_fatal(&self) -> bool {
        match self {
            ApiFuzzError::Schema(_) | ApiFuzzError::DefinitionSource { .. } => true,
            ApiFuzzError::TemplateCompile(e) => {
                matches!(e, TemplateCompileError::UnresolvableBaseUrl { .. })
            }
            ApiFuzzError::Io(_) => true,
            ApiFuzzError::TransientNetwork { .. } | ApiFuzzError::TargetProtocolViolation { .. } => {
                false
            }
        }
    }
}
