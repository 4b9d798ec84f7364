//! JUnit XML Reporter
//!
//! One test case per compiled template, failing once per finding recorded
//! against it, plus one failing case per operation the compiler skipped.
//! Compatible with Jenkins, GitLab, Azure DevOps and other CI systems.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::fuzzer::{AnomalyKind, Finding, FuzzResults};

/// Generate JUnit XML output from run results
pub fn generate_junit(results: &FuzzResults) -> String {
    let skipped: Vec<&Finding> = results
        .findings
        .iter()
        .filter(|f| f.anomaly == AnomalyKind::CompileFailure)
        .collect();
    let tests = results.templates.len() + skipped.len();
    let failures = results.findings.len();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuite name=\"apifuzz\" tests=\"{}\" failures=\"{}\" errors=\"0\" time=\"{:.3}\">\n",
        tests,
        failures,
        results.duration_ms as f64 / 1000.0
    ));

    for template in &results.templates {
        let findings: Vec<&Finding> = results
            .anomalies()
            .filter(|f| &f.template == template)
            .collect();
        if findings.is_empty() {
            xml.push_str(&format!(
                "  <testcase name=\"{}\" classname=\"apifuzz.fuzz\" time=\"0.000\"/>\n",
                escape_xml(template)
            ));
            continue;
        }

        xml.push_str(&format!(
            "  <testcase name=\"{}\" classname=\"apifuzz.fuzz\" time=\"0.000\">\n",
            escape_xml(template)
        ));
        for finding in findings {
            push_failure(&mut xml, finding);
        }
        xml.push_str("  </testcase>\n");
    }

    for finding in skipped {
        xml.push_str(&format!(
            "  <testcase name=\"{}\" classname=\"apifuzz.compile\" time=\"0.000\">\n",
            escape_xml(&finding.template)
        ));
        push_failure(&mut xml, finding);
        xml.push_str("  </testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    xml
}

fn push_failure(xml: &mut String, finding: &Finding) {
    let kind = finding
        .mutation
        .as_ref()
        .map(|m| m.kind.as_str())
        .unwrap_or("baseline");
    xml.push_str(&format!(
        "    <failure message=\"{}\" type=\"{}\">\n",
        escape_xml(&truncate(&format!("{}: {}", kind, finding.detail), 200)),
        finding.severity.label()
    ));

    let mut body = String::new();
    body.push_str(&format!("Anomaly: {}\n", finding.anomaly));
    body.push_str(&format!("Severity: {}\n", finding.severity));
    if let Some(mutation) = &finding.mutation {
        body.push_str(&format!(
            "Mutation: {} ({}) on {} '{}'\nValue: {}\n",
            mutation.kind,
            mutation.category.as_str(),
            mutation.location,
            mutation.field,
            mutation.value
        ));
    }
    if let Some(request) = &finding.request {
        body.push_str(&format!("Request: {} {}\n", request.method, request.url));
    }
    if let Some(response) = &finding.response {
        body.push_str(&format!("Response: HTTP {}\n", response.status));
    }
    if let Some(error) = &finding.error {
        body.push_str(&format!("Error: {}\n", error));
    }
    xml.push_str(&escape_xml(&body));
    xml.push_str("    </failure>\n");
}

/// Write the JUnit report to `path`
pub fn write_junit(results: &FuzzResults, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, generate_junit(results))
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Truncate string to max characters with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
