//! Anomaly Detection - Classify execution results
//!
//! Decides whether an execution result is worth a finding and how severe
//! it is. Thresholds live in a [`ClassificationPolicy`] so they can be
//! tuned per target.

use serde::{Deserialize, Serialize};

use crate::client::{Outcome, ResponseSummary};
use crate::schema::StatusMatcher;
use crate::template::FuzzTemplate;

use super::mutation::strategy::MutationKind;

/// Severity level for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Label used as the JUnit failure type
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What made a result anomalous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Refused/reset after the retry
    TransientNetworkFailure,
    NetworkFailure,
    Timeout,
    ServerError,
    /// A client error the operation does not declare
    UndeclaredStatus,
    /// A declared-required response field is absent
    MissingResponseField,
    /// A JSON object was declared but the body is not one
    MalformedResponseBody,
    /// The operation could not be compiled; no request was sent
    CompileFailure,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::TransientNetworkFailure => "transient_network_failure",
            AnomalyKind::NetworkFailure => "network_failure",
            AnomalyKind::Timeout => "timeout",
            AnomalyKind::ServerError => "server_error",
            AnomalyKind::UndeclaredStatus => "undeclared_status",
            AnomalyKind::MissingResponseField => "missing_response_field",
            AnomalyKind::MalformedResponseBody => "malformed_response_body",
            AnomalyKind::CompileFailure => "compile_failure",
        }
    }

    /// Response broke the declared contract
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            AnomalyKind::UndeclaredStatus
                | AnomalyKind::MissingResponseField
                | AnomalyKind::MalformedResponseBody
        )
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunable anomaly thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    /// 5xx codes accepted as a reasonable answer to encoding/size mutations
    pub tolerated_malformed_statuses: Vec<u16>,
    /// Flag 4xx codes outside an operation's declared set of specific codes
    pub flag_undeclared_client_errors: bool,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            tolerated_malformed_statuses: vec![501, 505],
            flag_undeclared_client_errors: true,
        }
    }
}

/// Verdict for an anomalous result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub severity: Severity,
    pub anomaly: AnomalyKind,
    pub detail: String,
}

impl Classification {
    fn new(severity: Severity, anomaly: AnomalyKind, detail: impl Into<String>) -> Self {
        Self {
            severity,
            anomaly,
            detail: detail.into(),
        }
    }
}

/// Classifies execution results against a template's declared contract
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    policy: ClassificationPolicy,
}

impl AnomalyDetector {
    pub fn new(policy: ClassificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    /// `None` when the result is not anomalous. `mutation` is `None` for
    /// baseline requests.
    pub fn classify(
        &self,
        template: &FuzzTemplate,
        mutation: Option<MutationKind>,
        outcome: &Outcome,
    ) -> Option<Classification> {
        match outcome {
            Outcome::Response(response) => self.classify_response(template, mutation, response),
            Outcome::Timeout => Some(Classification::new(
                Severity::Medium,
                AnomalyKind::Timeout,
                "no response within the request timeout",
            )),
            Outcome::TransientNetworkError { message } => Some(Classification::new(
                Severity::Critical,
                AnomalyKind::TransientNetworkFailure,
                message.clone(),
            )),
            Outcome::NetworkError { message } => Some(Classification::new(
                Severity::High,
                AnomalyKind::NetworkFailure,
                message.clone(),
            )),
            // Our own request was unencodable; the target never saw it
            Outcome::Unsendable { .. } => None,
        }
    }

    fn classify_response(
        &self,
        template: &FuzzTemplate,
        mutation: Option<MutationKind>,
        response: &ResponseSummary,
    ) -> Option<Classification> {
        let status = response.status;

        if response.is_server_error() {
            let malformed = mutation.is_some_and(|kind| kind.is_malformed());
            if malformed && self.policy.tolerated_malformed_statuses.contains(&status) {
                return None;
            }
            return Some(Classification::new(
                Severity::High,
                AnomalyKind::ServerError,
                format!("server error {}", status),
            ));
        }

        if response.is_client_error() {
            if self.policy.flag_undeclared_client_errors && self.undeclared_client_error(template, status) {
                return Some(Classification::new(
                    Severity::Low,
                    AnomalyKind::UndeclaredStatus,
                    format!("status {} is not among the declared client errors", status),
                ));
            }
            // Rejecting bad input is the expected answer
            if mutation.is_some() {
                return None;
            }
        }

        self.check_structure(template, response)
    }

    /// True when the operation lists specific 4xx codes, no 4XX range, no
    /// default, and `status` is not among them
    fn undeclared_client_error(&self, template: &FuzzTemplate, status: u16) -> bool {
        let declared = &template.operation.responses;
        let open = declared.iter().any(|r| {
            matches!(r.status, StatusMatcher::Default | StatusMatcher::Range(4))
        });
        let specific: Vec<u16> = declared
            .iter()
            .filter_map(|r| match r.status {
                StatusMatcher::Code(code) if (400..500).contains(&code) => Some(code),
                _ => None,
            })
            .collect();
        !open && !specific.is_empty() && !specific.contains(&status)
    }

    fn check_structure(
        &self,
        template: &FuzzTemplate,
        response: &ResponseSummary,
    ) -> Option<Classification> {
        let expectation = template
            .expectation_for(response.status)
            .filter(|e| e.status != StatusMatcher::Default)?;
        if !expectation.expects_object || response.truncated {
            return None;
        }

        let body = response.json();
        let Some(object) = body.as_ref().and_then(|b| b.as_object()) else {
            return Some(Classification::new(
                Severity::Low,
                AnomalyKind::MalformedResponseBody,
                format!("status {} declares a JSON object body", response.status),
            ));
        };

        let missing: Vec<&str> = expectation
            .required_fields
            .iter()
            .filter(|f| !object.contains_key(f.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            None
        } else {
            Some(Classification::new(
                Severity::Low,
                AnomalyKind::MissingResponseField,
                format!("required response fields absent: {}", missing.join(", ")),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{HttpMethod, Operation, ResponseSpec};
    use crate::template::ResponseExpectation;

    fn template(responses: &[&str], expectations: Vec<ResponseExpectation>) -> FuzzTemplate {
        FuzzTemplate {
            operation: Operation {
                method: HttpMethod::Get,
                path: "/items/{id}".to_string(),
                operation_id: None,
                parameters: vec![],
                request_body: None,
                responses: responses
                    .iter()
                    .map(|key| ResponseSpec {
                        status: StatusMatcher::parse(key).unwrap(),
                        schema: None,
                    })
                    .collect(),
            },
            base_url: "http://localhost".to_string(),
            fields: vec![],
            static_headers: vec![],
            body_encoding: None,
            expectations,
            response_fields: vec![],
        }
    }

    fn response(status: u16, body: &str) -> Outcome {
        Outcome::Response(ResponseSummary {
            status,
            content_type: None,
            body: body.as_bytes().to_vec(),
            truncated: false,
        })
    }

    fn object_expectation(status: &str, required: &[&str]) -> ResponseExpectation {
        ResponseExpectation {
            status: StatusMatcher::parse(status).unwrap(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            expects_object: true,
        }
    }

    #[test]
    fn server_errors_are_high() {
        let detector = AnomalyDetector::default();
        let t = template(&["200"], vec![]);
        let verdict = detector
            .classify(&t, Some(MutationKind::BoundaryNegative), &response(500, ""))
            .unwrap();
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.anomaly, AnomalyKind::ServerError);
    }

    #[test]
    fn tolerated_status_for_malformed_input() {
        let detector = AnomalyDetector::default();
        let t = template(&["200"], vec![]);
        assert!(detector
            .classify(&t, Some(MutationKind::NonUtf8), &response(501, ""))
            .is_none());
        // Same status for a non-malformed mutation is still a finding
        assert!(detector
            .classify(&t, Some(MutationKind::TypeConfusion), &response(501, ""))
            .is_some());
        // 500 is never tolerated by default
        assert!(detector
            .classify(&t, Some(MutationKind::OversizedString), &response(500, ""))
            .is_some());
    }

    #[test]
    fn client_errors_are_expected() {
        let detector = AnomalyDetector::default();
        let t = template(&["200"], vec![]);
        assert!(detector
            .classify(&t, Some(MutationKind::TypeConfusion), &response(400, ""))
            .is_none());
        assert!(detector.classify(&t, None, &response(404, "")).is_none());
    }

    #[test]
    fn undeclared_client_error_is_protocol_violation() {
        let detector = AnomalyDetector::default();
        let t = template(&["200", "400"], vec![]);
        let verdict = detector
            .classify(&t, Some(MutationKind::EmptyValue), &response(422, ""))
            .unwrap();
        assert_eq!(verdict.anomaly, AnomalyKind::UndeclaredStatus);
        assert_eq!(verdict.severity, Severity::Low);
        assert!(verdict.anomaly.is_protocol_violation());

        assert!(detector
            .classify(&t, Some(MutationKind::EmptyValue), &response(400, ""))
            .is_none());

        // A 4XX range or default covers every client error
        let open = template(&["200", "400", "4XX"], vec![]);
        assert!(detector
            .classify(&open, Some(MutationKind::EmptyValue), &response(422, ""))
            .is_none());

        let lenient = AnomalyDetector::new(ClassificationPolicy {
            flag_undeclared_client_errors: false,
            ..Default::default()
        });
        assert!(lenient
            .classify(&t, Some(MutationKind::EmptyValue), &response(422, ""))
            .is_none());
    }

    #[test]
    fn network_outcomes() {
        let detector = AnomalyDetector::default();
        let t = template(&["200"], vec![]);
        let transient = Outcome::TransientNetworkError {
            message: "reset".to_string(),
        };
        assert_eq!(
            detector.classify(&t, None, &transient).unwrap().severity,
            Severity::Critical
        );
        assert_eq!(
            detector.classify(&t, None, &Outcome::Timeout).unwrap().anomaly,
            AnomalyKind::Timeout
        );
        let unsendable = Outcome::Unsendable {
            message: "bad header".to_string(),
        };
        assert!(detector.classify(&t, None, &unsendable).is_none());
    }

    #[test]
    fn missing_required_response_field() {
        let detector = AnomalyDetector::default();
        let t = template(&["200"], vec![object_expectation("200", &["id", "name"])]);

        assert!(detector
            .classify(&t, None, &response(200, r#"{"id": 1, "name": "a"}"#))
            .is_none());

        let verdict = detector
            .classify(&t, None, &response(200, r#"{"id": 1}"#))
            .unwrap();
        assert_eq!(verdict.anomaly, AnomalyKind::MissingResponseField);
        assert!(verdict.detail.contains("name"));

        let verdict = detector
            .classify(&t, Some(MutationKind::EmptyValue), &response(200, "<html>"))
            .unwrap();
        assert_eq!(verdict.anomaly, AnomalyKind::MalformedResponseBody);
    }

    #[test]
    fn default_expectation_is_not_enforced() {
        let detector = AnomalyDetector::default();
        let t = template(&["default"], vec![object_expectation("default", &["code"])]);
        assert!(detector.classify(&t, None, &response(200, "ok")).is_none());
    }
}
