//! File reputation service.

use crate::{config::Config, error, utils::FingerPrint};
use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use std::{collections::BTreeMap, path::Path, time::Duration};

/// Antivirus reputation lookup keyed by content hash.
pub trait ReputationService: Send + Sync {
    /// Looks the artifact up by its hash, scheduling a scan when the
    /// service has never seen the file.
    fn lookup(&self, artifact: &Path, fingerprint: &FingerPrint) -> Result<ReputationReport>;
}

/// Verdict of a single antivirus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineVerdict {
    /// Whether the engine flagged the file.
    pub detected: bool,
    /// Engine version.
    #[serde(default)]
    pub version: Option<String>,
    /// Signature name, when detected.
    #[serde(default)]
    pub result: Option<String>,
    /// Date of the last engine update.
    #[serde(default)]
    pub update: Option<String>,
}

/// Reputation lookup response.
///
/// A "queued" response only carries the identification fields; a
/// "completed" one additionally has the hashes, the detection counters and
/// the per-engine verdict map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationReport {
    /// Service response code.
    pub response_code: i32,
    /// Human readable status message.
    #[serde(default)]
    pub verbose_msg: String,
    /// Resource identifier of the lookup.
    #[serde(default)]
    pub resource: String,
    /// Identifier of the scheduled or finished scan.
    #[serde(default)]
    pub scan_id: String,
    /// SHA-256 of the file.
    #[serde(default)]
    pub sha256: String,
    /// Permanent link to the report.
    #[serde(default)]
    pub permalink: String,
    /// MD5 of the file, only in completed reports.
    #[serde(default)]
    pub md5: Option<String>,
    /// SHA-1 of the file, only in completed reports.
    #[serde(default)]
    pub sha1: Option<String>,
    /// Date of the scan, only in completed reports.
    #[serde(default)]
    pub scan_date: Option<String>,
    /// Number of engines that flagged the file.
    #[serde(default)]
    pub positives: Option<u32>,
    /// Number of engines that scanned the file.
    #[serde(default)]
    pub total: Option<u32>,
    /// Per-engine verdicts, only in completed reports.
    #[serde(default)]
    pub scans: Option<BTreeMap<String, EngineVerdict>>,
}

impl ReputationReport {
    /// Returns `true` if the report carries finished scan results instead
    /// of a queued acknowledgement.
    pub fn is_completed(&self) -> bool {
        self.scans.is_some()
    }
}

/// Production reputation client, VirusTotal shaped.
pub struct VirusTotalClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl VirusTotalClient {
    /// Creates a new client from the configuration.
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout()))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.reputation_url().to_owned(),
            api_key: config.reputation_api_key().map(str::to_owned),
        }
    }
}

impl ReputationService for VirusTotalClient {
    fn lookup(&self, artifact: &Path, fingerprint: &FingerPrint) -> Result<ReputationReport> {
        let api_key = self.api_key.as_deref().ok_or_else(|| error::Kind::Config {
            message: String::from("no reputation service API key is configured"),
        })?;

        let report: ReputationReport = self
            .client
            .get(&format!("{}/report", self.url))
            .query(&[("apikey", api_key), ("resource", fingerprint.sha256())])
            .send()
            .context("the reputation report request failed")?
            .error_for_status()
            .context("the reputation service rejected the report request")?
            .json()
            .context("could not decode the reputation report")?;

        if report.response_code != 0 {
            return Ok(report);
        }

        // The service has never seen the file: upload it for scanning and
        // return the queued acknowledgement.
        let form = multipart::Form::new()
            .file("file", artifact)
            .context("could not prepare the artifact upload")?;
        let queued = self
            .client
            .post(&format!("{}/scan", self.url))
            .query(&[("apikey", api_key)])
            .multipart(form)
            .send()
            .context("the reputation scan request failed")?
            .error_for_status()
            .context("the reputation service rejected the scan request")?
            .json()
            .context("could not decode the reputation scan response")?;

        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::ReputationReport;

    #[test]
    fn it_decodes_a_queued_response() {
        let report: ReputationReport = serde_json::from_str(
            r#"{
            "response_code": 1,
            "verbose_msg": "Scan request successfully queued",
            "resource": "abc",
            "scan_id": "abc-1234",
            "sha256": "abc",
            "permalink": "https://reputation.example.com/abc"
        }"#,
        )
        .unwrap();

        assert!(!report.is_completed());
        assert_eq!(report.response_code, 1);
        assert_eq!(report.scan_id, "abc-1234");
    }

    #[test]
    fn it_decodes_a_completed_response() {
        let report: ReputationReport = serde_json::from_str(
            r#"{
            "response_code": 1,
            "verbose_msg": "Scan finished",
            "resource": "abc",
            "scan_id": "abc-1234",
            "sha256": "abc",
            "permalink": "https://reputation.example.com/abc",
            "md5": "d41d8cd98f00b204e9800998ecf8427e",
            "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709",
            "scan_date": "2018-03-01 09:00:00",
            "positives": 2,
            "total": 60,
            "scans": {
                "Engine A": {"detected": true, "version": "1.0", "result": "iOS.Spy", "update": "20180301"},
                "Engine B": {"detected": false, "version": "4.2", "result": null, "update": "20180228"}
            }
        }"#,
        )
        .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.positives, Some(2));
        let scans = report.scans.unwrap();
        assert!(scans["Engine A"].detected);
        assert_eq!(scans["Engine A"].result.as_deref(), Some("iOS.Spy"));
        assert!(!scans["Engine B"].detected);
    }
}
