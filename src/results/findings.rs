//! Finding types produced by the analyzers.

use crate::{static_analysis::macho::MachoInfo, status::Status};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::{fmt, result};

/// Required prefix for weakness classification identifiers.
pub const WEAKNESS_PREFIX: &str = "CWE-";

/// One reported observation with a status and an optional weakness
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    title: String,
    description: String,
    status: Status,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwe: Option<String>,
}

impl Finding {
    /// Creates a new finding.
    ///
    /// Panics if the weakness identifier does not carry the `CWE-` prefix;
    /// identifiers are static data, so a missing prefix is a programming
    /// error, not an input error.
    pub fn new<T: Into<String>, D: Into<String>>(
        title: T,
        description: D,
        status: Status,
        score: f32,
        cwe: Option<&str>,
    ) -> Self {
        let cwe = cwe.map(|id| {
            assert!(
                id.starts_with(WEAKNESS_PREFIX),
                "weakness identifier `{}` is missing the `{}` prefix",
                id,
                WEAKNESS_PREFIX
            );
            id.to_owned()
        });

        Self {
            title: title.into(),
            description: description.into(),
            status,
            score,
            cwe,
        }
    }

    /// Gets the title of the finding.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Gets the description of the finding.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Gets the status of the finding.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Gets the severity score of the finding.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Gets the weakness classification identifier, if any.
    pub fn cwe(&self) -> Option<&str> {
        self.cwe.as_deref()
    }
}

/// A code rule that fired, with the files where it was observed.
#[derive(Debug, Clone, Serialize)]
pub struct CodeFinding {
    description: String,
    status: Status,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwe: Option<String>,
    paths: Vec<String>,
}

impl CodeFinding {
    /// Gets the description of the rule.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Gets the status of the rule.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Gets the paths where the rule fired.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// An API usage observation, with the files where it was seen.
#[derive(Debug, Clone, Serialize)]
pub struct ApiFinding {
    description: String,
    paths: Vec<String>,
}

impl ApiFinding {
    /// Gets the description of the API.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Gets the paths where the API was used.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// A URL literal, with the files where it appears.
#[derive(Debug, Clone, Serialize)]
pub struct UrlFinding {
    url: String,
    paths: Vec<String>,
}

impl UrlFinding {
    /// Gets the URL literal.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Gets the paths where the URL appears.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// An email literal, with the files where it appears.
#[derive(Debug, Clone, Serialize)]
pub struct EmailFinding {
    email: String,
    paths: Vec<String>,
}

impl EmailFinding {
    /// Gets the email literal.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Gets the paths where the email appears.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// Aggregated output of the code analysis.
///
/// Entries merge by rule description (or literal value, for URL and email
/// findings): a rule firing again in another file appends that file to the
/// existing entry instead of creating a duplicate. The maps are keyed on
/// the identity but iterate in first-seen order, so the output is an
/// order-preserving sequence.
#[derive(Debug, Default)]
pub struct CodeReport {
    findings: IndexMap<String, CodeFinding>,
    apis: IndexMap<String, ApiFinding>,
    urls: IndexMap<String, UrlFinding>,
    emails: IndexMap<String, EmailFinding>,
    bad_domains: Vec<String>,
}

impl CodeReport {
    /// Records that a rule fired in the given file.
    pub fn record_finding(
        &mut self,
        description: &str,
        status: Status,
        score: f32,
        cwe: Option<&str>,
        path: &str,
    ) {
        let entry = self
            .findings
            .entry(description.to_owned())
            .or_insert_with(|| CodeFinding {
                description: description.to_owned(),
                status,
                score,
                cwe: cwe.map(|id| {
                    assert!(
                        id.starts_with(WEAKNESS_PREFIX),
                        "weakness identifier `{}` is missing the `{}` prefix",
                        id,
                        WEAKNESS_PREFIX
                    );
                    id.to_owned()
                }),
                paths: Vec::new(),
            });
        push_unique(&mut entry.paths, path);
    }

    /// Records that an API was used in the given file.
    pub fn record_api(&mut self, description: &str, path: &str) {
        let entry = self
            .apis
            .entry(description.to_owned())
            .or_insert_with(|| ApiFinding {
                description: description.to_owned(),
                paths: Vec::new(),
            });
        push_unique(&mut entry.paths, path);
    }

    /// Records a URL literal found in the given file.
    pub fn record_url(&mut self, url: &str, path: &str) {
        let entry = self.urls.entry(url.to_owned()).or_insert_with(|| UrlFinding {
            url: url.to_owned(),
            paths: Vec::new(),
        });
        push_unique(&mut entry.paths, path);
    }

    /// Records an email literal found in the given file.
    pub fn record_email(&mut self, email: &str, path: &str) {
        let entry = self
            .emails
            .entry(email.to_owned())
            .or_insert_with(|| EmailFinding {
                email: email.to_owned(),
                paths: Vec::new(),
            });
        push_unique(&mut entry.paths, path);
    }

    /// Sets the subset of extracted URLs that matched the known-bad domain
    /// list.
    pub fn set_bad_domains(&mut self, domains: Vec<String>) {
        self.bad_domains = domains;
    }

    /// Iterates over the rule findings in first-seen order.
    pub fn findings(&self) -> impl Iterator<Item = &CodeFinding> {
        self.findings.values()
    }

    /// Iterates over the API findings in first-seen order.
    pub fn apis(&self) -> impl Iterator<Item = &ApiFinding> {
        self.apis.values()
    }

    /// Iterates over the URL findings in first-seen order.
    pub fn urls(&self) -> impl Iterator<Item = &UrlFinding> {
        self.urls.values()
    }

    /// Iterates over the email findings in first-seen order.
    pub fn emails(&self) -> impl Iterator<Item = &EmailFinding> {
        self.emails.values()
    }

    /// Gets the known-bad domains.
    pub fn bad_domains(&self) -> &[String] {
        &self.bad_domains
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
            && self.apis.is_empty()
            && self.urls.is_empty()
            && self.emails.is_empty()
    }
}

impl Serialize for CodeReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser_struct = serializer.serialize_struct("CodeReport", 5)?;
        ser_struct.serialize_field(
            "findings",
            &self.findings.values().collect::<Vec<_>>(),
        )?;
        ser_struct.serialize_field("apis", &self.apis.values().collect::<Vec<_>>())?;
        ser_struct.serialize_field("urls", &self.urls.values().collect::<Vec<_>>())?;
        ser_struct.serialize_field("emails", &self.emails.values().collect::<Vec<_>>())?;
        ser_struct.serialize_field("bad_domains", &self.bad_domains)?;
        ser_struct.end()
    }
}

fn push_unique(paths: &mut Vec<String>, path: &str) {
    if !paths.iter().any(|existing| existing == path) {
        paths.push(path.to_owned());
    }
}

/// Language family of the application binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    /// The binary links the Swift runtime.
    Swift,
    /// Plain Objective-C binary.
    ObjectiveC,
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swift => write!(f, "Swift"),
            Self::ObjectiveC => write!(f, "Objective-C"),
        }
    }
}

impl Serialize for BinaryType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Aggregated output of the binary analysis.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryReport {
    macho: MachoInfo,
    kind: BinaryType,
    findings: Vec<Finding>,
}

impl BinaryReport {
    /// Creates a new binary report.
    pub fn new(macho: MachoInfo, kind: BinaryType, findings: Vec<Finding>) -> Self {
        Self {
            macho,
            kind,
            findings,
        }
    }

    /// Gets the decoded Mach-O information.
    pub fn macho(&self) -> &MachoInfo {
        &self.macho
    }

    /// Gets the language family of the binary.
    pub fn kind(&self) -> BinaryType {
        self.kind
    }

    /// Gets the hardening and API findings.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::CodeReport;
    use crate::status::Status;

    #[test]
    fn it_merges_findings_by_description() {
        let mut report = CodeReport::default();
        report.record_finding("weak random", Status::Insecure, 7.5, Some("CWE-338"), "a.swift");
        report.record_finding("weak random", Status::Insecure, 7.5, Some("CWE-338"), "b.swift");
        report.record_finding("weak hash", Status::Warning, 5.0, Some("CWE-327"), "a.swift");

        let findings: Vec<_> = report.findings().collect();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].description(), "weak random");
        assert_eq!(findings[0].paths(), &["a.swift", "b.swift"]);
        assert_eq!(findings[1].description(), "weak hash");
    }

    #[test]
    fn it_does_not_duplicate_paths() {
        let mut report = CodeReport::default();
        report.record_finding("weak random", Status::Insecure, 7.5, None, "a.swift");
        report.record_finding("weak random", Status::Insecure, 7.5, None, "a.swift");

        let findings: Vec<_> = report.findings().collect();
        assert_eq!(findings[0].paths(), &["a.swift"]);
    }

    #[test]
    fn it_merges_literals_by_value() {
        let mut report = CodeReport::default();
        report.record_url("https://example.com", "a.swift");
        report.record_url("https://example.com", "b.swift");
        report.record_email("dev@example.com", "a.swift");

        let urls: Vec<_> = report.urls().collect();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].paths(), &["a.swift", "b.swift"]);
        assert_eq!(report.emails().count(), 1);
    }

    #[test]
    #[should_panic(expected = "missing the `CWE-` prefix")]
    fn it_rejects_unprefixed_weakness_identifiers() {
        let mut report = CodeReport::default();
        report.record_finding("weak random", Status::Insecure, 7.5, Some("338"), "a.swift");
    }
}
