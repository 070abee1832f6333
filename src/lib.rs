//! SIRA: Static iOS Rust Analyzer.
//!
//! Audits iOS application bundles and source trees for vulnerabilities
//! without executing them. The scan normalizes the input artifact once and
//! then fans the enabled analyzers out as independent tasks: a failing
//! analyzer reports its own error and never takes the others down with it.

#![forbid(unsafe_code)]
#![deny(trivial_casts, trivial_numeric_casts, unused_import_braces, unused_qualifications)]

#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod bundle;
/// Command Line Interface
pub mod cli;
mod config;
mod error;
pub mod results;
pub mod services;
pub mod static_analysis;
mod status;
mod utils;

pub use crate::{
    config::{AnalysisKind, Config},
    error::Kind as ErrorKind,
    results::{generate_report, AnalysisReport, Benchmark, TaskFailure},
    services::Services,
    status::Status,
    utils::{initialize_logger, print_error, print_warning, FingerPrint},
};

use crate::static_analysis::{code, files, otool, plist};
use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Instant,
};

/// Initialize the config with the config files and command line options.
///
/// On UNIX, if the local file (`config.toml`) does not exist, but the
/// global one does (`/etc/sira-analyzer/config.toml`), the latter is used.
/// Otherwise, the local file is used. Finally, if none of the files could
/// be loaded, the default config is used.
pub fn initialize_config(cli: &ArgMatches<'static>) -> Result<Config> {
    let config_path = PathBuf::from("config.toml");
    let global_config_path = PathBuf::from("/etc/sira-analyzer/config.toml");

    let mut config =
        if cfg!(target_family = "unix") && !config_path.exists() && global_config_path.exists() {
            Config::from_file(&global_config_path).context(
                "there was an error when reading the /etc/sira-analyzer/config.toml file",
            )?
        } else if config_path.exists() {
            Config::from_file(&config_path)
                .context("there was an error when reading the config.toml file")?
        } else {
            print_warning("Config file not found. Using default configuration");
            Config::default()
        };

    config
        .decorate_with_cli(cli)
        .context("there was an error reading config from CLI")?;

    Ok(config)
}

/// Gets the display name of the artifact being analyzed.
pub fn artifact_name(config: &Config) -> String {
    config
        .app_path()
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("application")
        .to_owned()
}

/// Analyzes the artifact described by the configuration.
///
/// The input is normalized exactly once; a normalization failure aborts
/// the scan. Every enabled analysis then runs as its own task against the
/// normalized layout, writing one disjoint section of the shared report.
/// The store lookup is special: it needs the bundle identifier the
/// manifest decoder produces, so the manifest task launches it once that
/// identifier is known, and it joins the same barrier as everything else.
///
/// Returns the aggregate report together with the per-task failure events.
/// The report only carries data from the analyses that succeeded.
pub fn analyze_application(
    config: &Config,
    services: &Services,
) -> Result<(AnalysisReport, Vec<TaskFailure>)> {
    let name = artifact_name(config);
    if !config.is_quiet() {
        println!();
        println!("Starting analysis of {}.", name.italic());
    }

    let start_time = Instant::now();
    let mut benchmarks = Vec::new();

    let normalized = bundle::normalize(config).context("bundle normalization failed")?;
    benchmarks.push(Benchmark::new("Bundle normalization", start_time.elapsed()));

    let binary_root = normalized.binary_root().map(PathBuf::from);
    let source_root = normalized.source_root().map(PathBuf::from);

    let fingerprint = if config.app_path().is_file() {
        match FingerPrint::new(config.app_path()) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                print_warning(format!("could not fingerprint the artifact: {:#}", e));
                None
            }
        }
    } else {
        None
    };

    let report = Arc::new(Mutex::new(AnalysisReport::default()));
    if let Some(ref fingerprint) = fingerprint {
        report.lock().unwrap().set_fingerprint(fingerprint.clone());
    }

    let failures: Arc<Mutex<Vec<TaskFailure>>> = Arc::new(Mutex::new(Vec::new()));
    let followups: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

    let analysis_start = Instant::now();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    for &kind in config.analyses() {
        // Every task gets its own clone of the request, so no task shares
        // mutable state with another.
        let task_config = config.clone();
        let task_report = Arc::clone(&report);
        let task_failures = Arc::clone(&failures);

        match kind {
            AnalysisKind::Manifest => {
                let task_binary_root = binary_root.clone();
                let task_source_root = source_root.clone();
                let task_followups = Arc::clone(&followups);
                let task_store = Arc::clone(&services.store);

                handles.push(thread::spawn(move || {
                    let manifest = plist::analysis(
                        &task_config,
                        task_binary_root.as_deref(),
                        task_source_root.as_deref(),
                    );
                    match manifest {
                        Ok(manifest) => {
                            let bundle_id = manifest.bundle_id().to_owned();
                            task_report.lock().unwrap().set_manifest(manifest);

                            if task_config.analyses().contains(&AnalysisKind::Store) {
                                launch_store_lookup(
                                    &task_config,
                                    bundle_id,
                                    task_store,
                                    task_report,
                                    task_failures,
                                    &task_followups,
                                );
                            }
                        }
                        Err(e) => record_failure(&task_failures, AnalysisKind::Manifest, &e),
                    }
                }));
            }
            AnalysisKind::Files => {
                let root = binary_root.clone().or_else(|| source_root.clone());

                handles.push(thread::spawn(move || match root {
                    Some(root) => match files::analysis(&task_config, &root) {
                        Ok(inventory) => task_report.lock().unwrap().set_files(inventory),
                        Err(e) => record_failure(&task_failures, AnalysisKind::Files, &e),
                    },
                    None => record_failure(
                        &task_failures,
                        AnalysisKind::Files,
                        &anyhow::anyhow!("there is no normalized tree to inventory"),
                    ),
                }));
            }
            AnalysisKind::Code => {
                let task_source_root = source_root.clone();
                let task_domains = Arc::clone(&services.domains);

                handles.push(thread::spawn(move || match task_source_root {
                    Some(root) => match code::analysis(&task_config, &root) {
                        Ok(mut code_report) => {
                            let urls: Vec<String> =
                                code_report.urls().map(|u| u.url().to_owned()).collect();
                            if !urls.is_empty() {
                                match task_domains.known_bad(&urls) {
                                    Ok(bad) => code_report.set_bad_domains(bad),
                                    Err(e) => print_warning(format!(
                                        "the malware domain check failed: {:#}",
                                        e
                                    )),
                                }
                            }
                            task_report.lock().unwrap().set_code(code_report);
                        }
                        Err(e) => record_failure(&task_failures, AnalysisKind::Code, &e),
                    },
                    None => record_failure(
                        &task_failures,
                        AnalysisKind::Code,
                        &anyhow::anyhow!("there is no source tree to analyze"),
                    ),
                }));
            }
            AnalysisKind::Binary => {
                let task_binary_root = binary_root.clone();
                let task_tools = Arc::clone(&services.tools);

                handles.push(thread::spawn(move || match task_binary_root {
                    Some(root) => match otool::analysis(&task_config, &*task_tools, &root) {
                        Ok(binary_report) => task_report.lock().unwrap().set_binary(binary_report),
                        Err(e) => record_failure(&task_failures, AnalysisKind::Binary, &e),
                    },
                    None => record_failure(
                        &task_failures,
                        AnalysisKind::Binary,
                        &anyhow::anyhow!("there is no compiled bundle to analyze"),
                    ),
                }));
            }
            AnalysisKind::Reputation => {
                let task_fingerprint = fingerprint.clone();
                let task_reputation = Arc::clone(&services.reputation);

                handles.push(thread::spawn(move || match task_fingerprint {
                    Some(fingerprint) => {
                        match task_reputation.lookup(task_config.app_path(), &fingerprint) {
                            Ok(reputation) => {
                                task_report.lock().unwrap().set_reputation(reputation)
                            }
                            Err(e) => record_failure(&task_failures, AnalysisKind::Reputation, &e),
                        }
                    }
                    None => record_failure(
                        &task_failures,
                        AnalysisKind::Reputation,
                        &anyhow::anyhow!("the reputation lookup needs a file artifact to hash"),
                    ),
                }));
            }
            AnalysisKind::Store => {
                // Launched by the manifest task once the bundle identifier
                // is known.
                if !config.analyses().contains(&AnalysisKind::Manifest) {
                    record_failure(
                        &task_failures,
                        AnalysisKind::Store,
                        &anyhow::anyhow!("the store lookup needs the manifest analysis"),
                    );
                }
            }
        }
    }

    for handle in handles {
        if let Err(e) = handle.join() {
            print_warning(format!(
                "an error occurred when joining an analysis task: {:?}",
                e
            ));
        }
    }

    // Conditionally launched tasks join the same barrier before the report
    // is considered complete.
    let pending: Vec<_> = followups.lock().unwrap().drain(..).collect();
    for handle in pending {
        if let Err(e) = handle.join() {
            print_warning(format!(
                "an error occurred when joining a follow-up task: {:?}",
                e
            ));
        }
    }

    benchmarks.push(Benchmark::new("Analysis tasks", analysis_start.elapsed()));
    benchmarks.push(Benchmark::new(
        format!("Total time for {}", name),
        start_time.elapsed(),
    ));
    if config.is_bench() {
        println!();
        for benchmark in &benchmarks {
            println!("{}", benchmark);
        }
    }

    let report = Arc::try_unwrap(report).unwrap().into_inner().unwrap();
    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();

    if !config.is_quiet() {
        println!();
        if failures.is_empty() {
            println!("{}", "The analysis finished without errors.".green());
        } else {
            println!(
                "The analysis finished, but {} of the analyses failed.",
                failures.len()
            );
        }
    }

    Ok((report, failures))
}

/// Launches the store lookup task with the identifier the manifest decoder
/// just produced, parking its handle where the orchestrator joins it.
fn launch_store_lookup(
    config: &Config,
    bundle_id: String,
    store: Arc<dyn services::store::StoreService>,
    report: Arc<Mutex<AnalysisReport>>,
    failures: Arc<Mutex<Vec<TaskFailure>>>,
    followups: &Mutex<Vec<JoinHandle<()>>>,
) {
    if bundle_id.is_empty() {
        record_failure(
            &failures,
            AnalysisKind::Store,
            &anyhow::anyhow!("the manifest has no bundle identifier"),
        );
        return;
    }

    let country = config.country().to_owned();
    let handle = thread::spawn(move || match store.lookup(&bundle_id, &country) {
        Ok(results) => report.lock().unwrap().set_store(results),
        Err(e) => record_failure(&failures, AnalysisKind::Store, &e),
    });

    followups.lock().unwrap().push(handle);
}

/// Records a task failure on the side channel and warns about it.
fn record_failure(failures: &Mutex<Vec<TaskFailure>>, kind: AnalysisKind, error: &anyhow::Error) {
    print_warning(format!("the {} analysis failed: {:#}", kind, error));
    failures
        .lock()
        .unwrap()
        .push(TaskFailure::new(kind, format!("{:#}", error)));
}

#[cfg(test)]
mod tests {
    use super::{analyze_application, AnalysisKind, Config, Services};
    use crate::{
        services::{
            domains::DomainList,
            reputation::{ReputationReport, ReputationService},
            store::{StoreResult, StoreService},
        },
        static_analysis::otool::ToolRunner,
        utils::FingerPrint,
    };
    use anyhow::{bail, Result};
    use std::{
        fs,
        io::Write,
        path::Path,
        sync::{Arc, Mutex},
    };

    const SAMPLE_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>CFBundleExecutable</key>
    <string>Demo</string>
    <key>CFBundleIdentifier</key>
    <string>com.example.demo</string>
    <key>CFBundleShortVersionString</key>
    <string>1.2.0</string>
</dict>
</plist>
"#;

    /// Tool runner that replays canned dumps of a Swift sample binary.
    struct CannedTools;

    impl ToolRunner for CannedTools {
        fn header_dump(&self, _executable: &Path) -> Result<String> {
            Ok(String::from("NOUNDEFS DYLDLINK TWOLEVEL PIE"))
        }

        fn symbol_dump(&self, _executable: &Path) -> Result<String> {
            Ok(String::from(
                "0x1000 115 ___stack_chk_guard\n\
                 0x1008 116 _objc_release\n\
                 0x1010 117 /usr/lib/swift/libswiftCore.dylib\n",
            ))
        }

        fn class_dump(&self, _executable: &Path) -> Result<String> {
            Ok(String::from("WKWebView"))
        }
    }

    /// Reputation service double that always fails, as if offline.
    struct OfflineReputation;

    impl ReputationService for OfflineReputation {
        fn lookup(&self, _artifact: &Path, _fingerprint: &FingerPrint) -> Result<ReputationReport> {
            bail!("network unreachable")
        }
    }

    /// Store double that records the identifier it was asked about.
    #[derive(Default)]
    struct SpyStore {
        asked: Mutex<Option<(String, String)>>,
    }

    impl StoreService for SpyStore {
        fn lookup(&self, bundle_id: &str, country: &str) -> Result<Vec<StoreResult>> {
            *self.asked.lock().unwrap() = Some((bundle_id.to_owned(), country.to_owned()));
            Ok(Vec::new())
        }
    }

    /// Store double that always fails, as if offline.
    struct OfflineStore;

    impl StoreService for OfflineStore {
        fn lookup(&self, _bundle_id: &str, _country: &str) -> Result<Vec<StoreResult>> {
            bail!("network unreachable")
        }
    }

    /// Domain list double that never flags anything.
    struct EmptyDomains;

    impl DomainList for EmptyDomains {
        fn known_bad(&self, _urls: &[String]) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn write_sample_ipa(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let options = zip::write::FileOptions::default();
        let mut zip = zip::ZipWriter::new(file);
        zip.add_directory("Payload/Demo.app/", options).unwrap();
        zip.start_file("Payload/Demo.app/Info.plist", options)
            .unwrap();
        zip.write_all(SAMPLE_PLIST.as_bytes()).unwrap();
        zip.start_file("Payload/Demo.app/Demo", options).unwrap();
        // 64-bit little-endian arm64 header.
        zip.write_all(&[
            0xCF, 0xFA, 0xED, 0xFE, 0x0C, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ])
        .unwrap();
        zip.finish().unwrap();
    }

    fn write_sample_sources(dir: &Path) {
        fs::create_dir_all(dir.join("Sources")).unwrap();
        fs::write(
            dir.join("Sources").join("A.swift"),
            "let x = random()\nlet url = \"https://api.example.com\"",
        )
        .unwrap();
    }

    fn write_rules(path: &Path) {
        fs::write(
            path,
            r#"{
            "rules": [
                {
                    "label": "Weak Random",
                    "description": "The application uses predictable random number generators",
                    "status": "insecure",
                    "score": 5.3,
                    "cwe": "CWE-338",
                    "regex": "\\brandom\\s*\\("
                }
            ]
        }"#,
        )
        .unwrap();
    }

    fn offline_services(store: Arc<dyn StoreService>) -> Services {
        Services {
            tools: Arc::new(CannedTools),
            reputation: Arc::new(OfflineReputation),
            store,
            domains: Arc::new(EmptyDomains),
        }
    }

    #[test]
    fn it_aggregates_partial_results_when_the_network_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("demo.ipa");
        write_sample_ipa(&ipa);
        let sources = dir.path().join("sources");
        write_sample_sources(&sources);
        let rules = dir.path().join("rules.json");
        write_rules(&rules);

        let mut config = Config::default();
        config.set_app_path(&ipa);
        config.set_source_path(&sources);
        config.set_rules_json(&rules);

        let services = offline_services(Arc::new(OfflineStore));
        let (report, failures) = analyze_application(&config, &services).unwrap();

        // Local analyses succeeded.
        assert!(report.manifest().is_some());
        assert!(report.files().is_some());
        assert!(report.code().is_some());
        assert!(report.binary().is_some());
        assert_eq!(report.code().unwrap().findings().count(), 1);

        // Network analyses are absent, with their own failure events.
        assert!(report.reputation().is_none());
        assert!(report.store().is_none());
        let mut failed: Vec<_> = failures.iter().map(|f| f.kind()).collect();
        failed.sort();
        assert_eq!(failed, &[AnalysisKind::Reputation, AnalysisKind::Store]);
    }

    #[test]
    fn it_classifies_swift_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("demo.ipa");
        write_sample_ipa(&ipa);

        let mut config = Config::default();
        config.set_app_path(&ipa);
        let mut analyses = std::collections::BTreeSet::new();
        let _ = analyses.insert(AnalysisKind::Binary);
        config.set_analyses(analyses);

        let services = offline_services(Arc::new(SpyStore::default()));
        let (report, failures) = analyze_application(&config, &services).unwrap();

        assert!(failures.is_empty());
        let binary = report.binary().unwrap();
        assert_eq!(format!("{}", binary.kind()), "Swift");
        assert_eq!(format!("{}", binary.macho().cpu()), "arm64");
        // Header, symbol and class extraction together.
        assert_eq!(binary.findings().len(), 13);
    }

    #[test]
    fn it_sequences_the_store_lookup_after_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("demo.ipa");
        write_sample_ipa(&ipa);

        let mut config = Config::default();
        config.set_app_path(&ipa);
        let mut analyses = std::collections::BTreeSet::new();
        let _ = analyses.insert(AnalysisKind::Manifest);
        let _ = analyses.insert(AnalysisKind::Store);
        config.set_analyses(analyses);

        let store = Arc::new(SpyStore::default());
        let store_service: Arc<dyn StoreService> = store.clone();
        let services = offline_services(store_service);
        let (report, failures) = analyze_application(&config, &services).unwrap();

        assert!(failures.is_empty());
        assert!(report.manifest().is_some());
        assert!(report.store().is_some());
        // The lookup observed the identifier the manifest decoder produced.
        let asked = store.asked.lock().unwrap().clone();
        assert_eq!(
            asked,
            Some((String::from("com.example.demo"), String::from("us")))
        );
    }

    #[test]
    fn it_fails_the_scan_when_nothing_recognizable_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_app_path(dir.path());

        let services = offline_services(Arc::new(SpyStore::default()));
        assert!(analyze_application(&config, &services).is_err());
    }
}
