//! Tests for the code analysis.

use super::{analysis, load_rules, scan_code, RuleSet};
use crate::{config::Config, results::findings::CodeReport, status::Status};
use std::fs;

fn ruleset(json: &str) -> RuleSet {
    serde_json::from_str(json).unwrap()
}

const WEAK_RANDOM_RULES: &str = r#"{
    "rules": [
        {
            "label": "Weak Random",
            "description": "The application uses predictable random number generators",
            "status": "insecure",
            "score": 5.3,
            "cwe": "CWE-338",
            "regex": "\\b(srand|random|rand)\\s*\\("
        }
    ]
}"#;

#[test]
fn it_merges_rule_findings_across_files() {
    let rules = ruleset(WEAK_RANDOM_RULES);
    let mut report = CodeReport::default();

    scan_code("let x = random()", "Sources/A.swift", &rules, &mut report);
    scan_code("let y = rand()", "Sources/B.swift", &rules, &mut report);

    let findings: Vec<_> = report.findings().collect();
    assert_eq!(findings.len(), 1);
    assert_eq!(
        findings[0].description(),
        "The application uses predictable random number generators"
    );
    assert_eq!(findings[0].paths(), &["Sources/A.swift", "Sources/B.swift"]);
}

#[test]
fn it_accumulates_at_most_one_path_entry_per_file() {
    let rules = ruleset(WEAK_RANDOM_RULES);
    let mut report = CodeReport::default();

    // The same file scanned twice must not duplicate its path entry.
    scan_code("let x = random()", "Sources/A.swift", &rules, &mut report);
    scan_code("let x = random()", "Sources/A.swift", &rules, &mut report);

    let findings: Vec<_> = report.findings().collect();
    assert_eq!(findings[0].paths(), &["Sources/A.swift"]);
}

#[test]
fn it_extracts_and_merges_url_and_email_literals() {
    let rules = ruleset(r#"{"rules": []}"#);
    let mut report = CodeReport::default();

    scan_code(
        "let api = \"https://api.example.com/v1\"\nlet mail = \"dev@example.com\"",
        "A.swift",
        &rules,
        &mut report,
    );
    scan_code(
        "let api = \"https://api.example.com/v1\"",
        "B.swift",
        &rules,
        &mut report,
    );

    let urls: Vec<_> = report.urls().collect();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url(), "https://api.example.com/v1");
    assert_eq!(urls[0].paths(), &["A.swift", "B.swift"]);

    let emails: Vec<_> = report.emails().collect();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].email(), "dev@example.com");
}

#[test]
fn it_respects_whitelists() {
    let rules = ruleset(
        r#"{
        "rules": [
            {
                "label": "Cleartext HTTP",
                "description": "The application connects to URLs over cleartext HTTP",
                "status": "warning",
                "score": 4.8,
                "cwe": "CWE-319",
                "regex": "http://[\\w.-]+",
                "whitelist": ["http://www\\.w3\\.org"]
            }
        ]
    }"#,
    );
    let mut report = CodeReport::default();

    scan_code(
        "let ns = \"http://www.w3.org/2000/svg\"",
        "A.swift",
        &rules,
        &mut report,
    );
    assert_eq!(report.findings().count(), 0);

    scan_code(
        "let url = \"http://insecure.example.com\"",
        "B.swift",
        &rules,
        &mut report,
    );
    assert_eq!(report.findings().count(), 1);
}

#[test]
fn it_respects_all_of_conjunctions() {
    let rules = ruleset(
        r#"{
        "rules": [
            {
                "label": "Sensitive Data in User Defaults",
                "description": "The application may store credentials in the unencrypted user defaults",
                "status": "warning",
                "score": 5.0,
                "cwe": "CWE-922",
                "regex": "(?i)(password|secret|token)",
                "all_of": ["NSUserDefaults"]
            }
        ]
    }"#,
    );
    let mut report = CodeReport::default();

    // The regex alone is not enough, the conjunction must hold too.
    scan_code("let password = field.text", "A.swift", &rules, &mut report);
    assert_eq!(report.findings().count(), 0);

    scan_code(
        "NSUserDefaults.standard.set(password, forKey: \"password\")",
        "B.swift",
        &rules,
        &mut report,
    );
    assert_eq!(report.findings().count(), 1);
}

#[test]
fn it_filters_rules_by_filename() {
    let rules = ruleset(
        r#"{
        "rules": [
            {
                "label": "Jailbreak Detection",
                "description": "The application checks for jailbroken devices",
                "status": "info",
                "score": 2.0,
                "regex": "cydia://",
                "exclude_file_regex": ".*\\.h"
            }
        ]
    }"#,
    );
    let mut report = CodeReport::default();

    scan_code("cydia://package", "Checks.h", &rules, &mut report);
    assert_eq!(report.findings().count(), 0);

    scan_code("cydia://package", "Checks.m", &rules, &mut report);
    assert_eq!(report.findings().count(), 1);
}

#[test]
fn it_records_api_usage_without_status() {
    let rules = ruleset(
        r#"{
        "rules": [],
        "apis": [
            {
                "description": "Keychain services",
                "regex": "\\bSecItem(Add|CopyMatching|Update|Delete)\\b"
            }
        ]
    }"#,
    );
    let mut report = CodeReport::default();

    scan_code("SecItemAdd(query, nil)", "Keychain.swift", &rules, &mut report);
    scan_code("SecItemCopyMatching(query, &result)", "Login.swift", &rules, &mut report);

    let apis: Vec<_> = report.apis().collect();
    assert_eq!(apis.len(), 1);
    assert_eq!(apis[0].paths(), &["Keychain.swift", "Login.swift"]);
}

#[test]
fn it_loads_rules_filtered_by_minimum_status() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.json");
    fs::write(
        &rules_path,
        r#"{
        "rules": [
            {
                "label": "Logging",
                "description": "The application logs information with NSLog",
                "status": "info",
                "score": 3.0,
                "regex": "NSLog"
            },
            {
                "label": "Weak Random",
                "description": "The application uses predictable random number generators",
                "status": "insecure",
                "score": 5.3,
                "cwe": "CWE-338",
                "regex": "\\brand\\s*\\("
            }
        ]
    }"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.set_rules_json(&rules_path);

    let all = load_rules(&config).unwrap();
    assert_eq!(all.rules().len(), 2);

    let toml_dir = tempfile::tempdir().unwrap();
    let config_path = toml_dir.path().join("config.toml");
    fs::write(&config_path, "min_status = \"warning\"").unwrap();
    let mut strict = Config::from_file(&config_path).unwrap();
    strict.set_rules_json(&rules_path);

    let filtered = load_rules(&strict).unwrap();
    assert_eq!(filtered.rules().len(), 1);
    assert_eq!(filtered.rules()[0].status(), Status::Insecure);
}

#[test]
fn it_analyzes_a_source_tree() {
    let dir = tempfile::tempdir().unwrap();
    let sources = dir.path().join("Sources");
    fs::create_dir_all(&sources).unwrap();
    fs::write(sources.join("A.swift"), "let x = random()").unwrap();
    fs::write(sources.join("B.swift"), "let y = rand()").unwrap();
    fs::write(sources.join("Notes.txt"), "random() here does not count").unwrap();
    // A filename the downstream tooling cannot consume: it gets renamed.
    fs::write(sources.join("View Controller.swift"), "let z = srand(42)").unwrap();

    let rules_path = dir.path().join("rules.json");
    fs::write(&rules_path, WEAK_RANDOM_RULES).unwrap();

    let mut config = Config::default();
    config.set_rules_json(&rules_path);

    let report = analysis(&config, dir.path()).unwrap();
    let findings: Vec<_> = report.findings().collect();
    assert_eq!(findings.len(), 1);

    let mut paths = findings[0].paths().to_vec();
    paths.sort();
    assert_eq!(
        paths,
        &[
            "Sources/A.swift",
            "Sources/B.swift",
            "Sources/View_Controller.swift"
        ]
    );
    assert!(sources.join("View_Controller.swift").exists());

    // Running the whole scan again yields path lists of equal length.
    let second = analysis(&config, dir.path()).unwrap();
    let second_findings: Vec<_> = second.findings().collect();
    assert_eq!(second_findings[0].paths().len(), 3);
}
