//! Results aggregation.

pub mod findings;
mod report;

pub use self::report::generate_report;

use crate::{
    config::AnalysisKind,
    services::{reputation::ReputationReport, store::StoreResult},
    static_analysis::{files::FileInventory, plist::ManifestInfo},
    utils::FingerPrint,
};
use chrono::Local;
use findings::{BinaryReport, CodeReport};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::{fmt, result, time::Duration};

/// Failure of a single analysis task.
///
/// Failures travel on this side channel, never inside the report: the
/// report carries data only, so an absent section plus a failure event is
/// distinguishable from a section that was never requested.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    kind: AnalysisKind,
    message: String,
}

impl TaskFailure {
    /// Creates a new task failure event.
    pub fn new<S: Into<String>>(kind: AnalysisKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Gets the analysis kind that failed.
    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    /// Gets the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} analysis failed: {}", self.kind, self.message)
    }
}

/// Timing of one analysis phase.
#[derive(Debug, Clone)]
pub struct Benchmark {
    label: String,
    duration: Duration,
}

impl Benchmark {
    /// Creates a new benchmark.
    pub fn new<S: Into<String>>(label: S, duration: Duration) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}.{:03} seconds",
            self.label,
            self.duration.as_secs(),
            self.duration.subsec_millis()
        )
    }
}

/// Aggregate report of one scan.
///
/// Every section is guarded by a presence flag, so a partial scan can be
/// told apart from an empty one. Each analysis task writes exactly one
/// section; the struct is only read after all tasks have joined.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    fingerprint: Option<FingerPrint>,
    manifest: Option<ManifestInfo>,
    files: Option<FileInventory>,
    code: Option<CodeReport>,
    binary: Option<BinaryReport>,
    reputation: Option<ReputationReport>,
    store: Option<Vec<StoreResult>>,
}

impl AnalysisReport {
    /// Sets the artifact fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: FingerPrint) {
        self.fingerprint = Some(fingerprint);
    }

    /// Gets the artifact fingerprint.
    pub fn fingerprint(&self) -> Option<&FingerPrint> {
        self.fingerprint.as_ref()
    }

    /// Sets the manifest section.
    pub fn set_manifest(&mut self, manifest: ManifestInfo) {
        self.manifest = Some(manifest);
    }

    /// Gets the manifest section.
    pub fn manifest(&self) -> Option<&ManifestInfo> {
        self.manifest.as_ref()
    }

    /// Sets the file inventory section.
    pub fn set_files(&mut self, files: FileInventory) {
        self.files = Some(files);
    }

    /// Gets the file inventory section.
    pub fn files(&self) -> Option<&FileInventory> {
        self.files.as_ref()
    }

    /// Sets the code analysis section.
    pub fn set_code(&mut self, code: CodeReport) {
        self.code = Some(code);
    }

    /// Gets the code analysis section.
    pub fn code(&self) -> Option<&CodeReport> {
        self.code.as_ref()
    }

    /// Sets the binary analysis section.
    pub fn set_binary(&mut self, binary: BinaryReport) {
        self.binary = Some(binary);
    }

    /// Gets the binary analysis section.
    pub fn binary(&self) -> Option<&BinaryReport> {
        self.binary.as_ref()
    }

    /// Sets the reputation section.
    pub fn set_reputation(&mut self, reputation: ReputationReport) {
        self.reputation = Some(reputation);
    }

    /// Gets the reputation section.
    pub fn reputation(&self) -> Option<&ReputationReport> {
        self.reputation.as_ref()
    }

    /// Sets the store lookup section.
    pub fn set_store(&mut self, store: Vec<StoreResult>) {
        self.store = Some(store);
    }

    /// Gets the store lookup section.
    pub fn store(&self) -> Option<&[StoreResult]> {
        self.store.as_deref()
    }
}

impl Serialize for AnalysisReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let now = Local::now();
        let mut ser_struct = serializer.serialize_struct("AnalysisReport", 15)?;

        ser_struct.serialize_field("sira_version", env!("CARGO_PKG_VERSION"))?;
        ser_struct.serialize_field("now", &now.to_rfc3339())?;

        ser_struct.serialize_field("fingerprint", &self.fingerprint)?;
        ser_struct.serialize_field("has_manifest", &self.manifest.is_some())?;
        ser_struct.serialize_field("manifest", &self.manifest)?;
        ser_struct.serialize_field("has_files", &self.files.is_some())?;
        ser_struct.serialize_field("files", &self.files)?;
        ser_struct.serialize_field("has_code", &self.code.is_some())?;
        ser_struct.serialize_field("code", &self.code)?;
        ser_struct.serialize_field("has_binary", &self.binary.is_some())?;
        ser_struct.serialize_field("binary", &self.binary)?;
        ser_struct.serialize_field("has_reputation", &self.reputation.is_some())?;
        ser_struct.serialize_field("reputation", &self.reputation)?;
        ser_struct.serialize_field("has_store", &self.store.is_some())?;
        ser_struct.serialize_field("store", &self.store)?;

        ser_struct.end()
    }
}

#[cfg(test)]
mod tests {
    use super::AnalysisReport;
    use crate::results::findings::CodeReport;

    #[test]
    fn it_tracks_section_presence() {
        let mut report = AnalysisReport::default();
        assert!(report.code().is_none());

        // An empty section is still a present section.
        report.set_code(CodeReport::default());
        assert!(report.code().is_some());
        assert!(report.code().unwrap().is_empty());
    }

    #[test]
    fn it_serializes_presence_flags() {
        let mut report = AnalysisReport::default();
        report.set_code(CodeReport::default());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["has_code"], true);
        assert_eq!(json["has_manifest"], false);
        assert!(json["manifest"].is_null());
    }
}
