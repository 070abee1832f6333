//! Code analysis module.

mod rule;
#[cfg(test)]
mod tests;

pub use rule::{load_rules, ApiRule, Rule, RuleSet};

use crate::{
    config::Config,
    results::findings::CodeReport,
    utils::{print_finding, print_warning, sanitize_filename},
};
use anyhow::Result;
use colored::Colorize;
use regex::Regex;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};
use walkdir::WalkDir;

/// Implementation file extensions considered by the rule engine.
const CODE_EXTENSIONS: &[&str] = &["swift", "m", "h"];

lazy_static! {
    static ref URL_REGEX: Regex =
        Regex::new(r"https?://[\w.-]+(?::\d+)?(?:/[\w./?%&=+#-]*)?").unwrap();
    static ref EMAIL_REGEX: Regex = Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap();
}

/// Analyzes the whole source tree of the application.
pub fn analysis(config: &Config, source_root: &Path) -> Result<CodeReport> {
    let ruleset = load_rules(config)?;

    let files = collect_files(source_root);
    let total_files = files.len();

    let ruleset = Arc::new(ruleset);
    let report = Arc::new(Mutex::new(CodeReport::default()));
    let files = Arc::new(Mutex::new(files));
    let root = Arc::new(source_root.to_path_buf());

    if config.is_verbose() {
        println!(
            "Starting analysis of the code with {} threads. {} files to go!",
            format!("{}", config.threads()).bold(),
            format!("{}", total_files).bold()
        );
    }

    let handles: Vec<_> = (0..config.threads())
        .map(|_| {
            let thread_files = Arc::clone(&files);
            let thread_ruleset = Arc::clone(&ruleset);
            let thread_report = Arc::clone(&report);
            let thread_root = Arc::clone(&root);

            thread::spawn(move || loop {
                let next = thread_files.lock().unwrap().pop();
                match next {
                    Some(f) => {
                        if let Err(e) =
                            analyze_file(&f, &thread_root, &thread_ruleset, &thread_report)
                        {
                            print_warning(format!(
                                "could not analyze `{}`. The analysis will continue, though. \
                                 Error: {}",
                                f.display(),
                                e
                            ))
                        }
                    }
                    None => break,
                }
            })
        })
        .collect();

    for t in handles {
        if let Err(e) = t.join() {
            print_warning(format!(
                "an error occurred when joining analysis threads: Error: {:?}",
                e
            ));
        }
    }

    if config.is_verbose() {
        println!();
        println!("{}", "The source code was analyzed correctly!".green());
    } else if !config.is_quiet() {
        println!("Source code analyzed.");
    }

    Ok(Arc::try_unwrap(report).unwrap().into_inner().unwrap())
}

/// Analyzes the given file, merging its observations into the shared
/// report.
fn analyze_file(
    path: &Path,
    root: &Path,
    ruleset: &RuleSet,
    report: &Mutex<CodeReport>,
) -> Result<()> {
    let path = sanitize_filename(path)?;
    let code = fs::read_to_string(&path)?;
    let relative = path
        .strip_prefix(root)
        .unwrap_or(&path)
        .to_string_lossy()
        .into_owned();

    let mut report = report.lock().unwrap();
    scan_code(&code, &relative, ruleset, &mut report);

    Ok(())
}

/// Evaluates every rule, API matcher and literal extractor against the
/// contents of one file, merging the observations into the report.
///
/// Rules are evaluated in file order; a predicate that does not apply is
/// simply "no match", never an error.
pub fn scan_code(code: &str, relative_path: &str, ruleset: &RuleSet, report: &mut CodeReport) {
    let filename = Path::new(relative_path)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(relative_path);

    for rule in ruleset.rules() {
        if !rule.has_to_check(filename) {
            continue;
        }
        if rule.matches(code) {
            report.record_finding(
                rule.description(),
                rule.status(),
                rule.score(),
                rule.cwe(),
                relative_path,
            );
            print_finding(rule.description(), rule.status());
        }
    }

    for api in ruleset.apis() {
        if api.matches(code) {
            report.record_api(api.description(), relative_path);
        }
    }

    for m in URL_REGEX.find_iter(code) {
        report.record_url(m.as_str(), relative_path);
    }

    for m in EMAIL_REGEX.find_iter(code) {
        report.record_email(m.as_str(), relative_path);
    }
}

/// Collects the implementation files of the source tree.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map_or(false, |ext| {
                    CODE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
                })
        })
        .map(|entry| entry.into_path())
        .collect()
}
