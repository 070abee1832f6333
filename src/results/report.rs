//! JSON report generation.

use super::AnalysisReport;
use crate::config::Config;
use anyhow::{Context, Result};
use colored::Colorize;
use std::{fs, path::PathBuf};

/// Writes the JSON report into the results folder.
///
/// The report lands in `<results>/<app_name>/results.json`. Existing
/// results are only overwritten with `--force`.
pub fn generate_report(
    config: &Config,
    report: &AnalysisReport,
    app_name: &str,
) -> Result<PathBuf> {
    let folder = config.results_folder().join(app_name);

    if folder.exists() {
        if config.is_force() {
            fs::remove_dir_all(&folder).with_context(|| {
                format!(
                    "there was an error when removing the results folder {}",
                    folder.display()
                )
            })?;
        } else {
            if !config.is_quiet() {
                println!("Skipping report generation.");
            }
            return Ok(folder.join("results.json"));
        }
    }

    fs::create_dir_all(&folder).with_context(|| {
        format!("could not create the results folder {}", folder.display())
    })?;

    let path = folder.join("results.json");
    let json = serde_json::to_string_pretty(report).context("could not serialize the report")?;
    fs::write(&path, json)
        .with_context(|| format!("could not write the report to {}", path.display()))?;

    if config.is_verbose() {
        println!(
            "{}",
            format!("JSON report generated in {}.", path.display()).green()
        );
    } else if !config.is_quiet() {
        println!("JSON report generated.");
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::generate_report;
    use crate::{config::Config, results::AnalysisReport};
    use std::fs;

    #[test]
    fn it_writes_the_report_and_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let config_toml = dir.path().join("config.toml");
        fs::write(
            &config_toml,
            format!(
                "results_folder = \"{}\"",
                dir.path().join("results").display()
            ),
        )
        .unwrap();
        let config = Config::from_file(&config_toml).unwrap();

        let report = AnalysisReport::default();
        let path = generate_report(&config, &report, "demo").unwrap();
        assert!(path.exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["has_manifest"], false);
        assert_eq!(json["sira_version"], env!("CARGO_PKG_VERSION"));
    }
}
