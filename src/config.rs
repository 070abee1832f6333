//! Configuration for the analyzer.
//!
//! The configuration is read from an optional TOML file and then decorated
//! with the command line options, which take precedence.

use crate::{error, status::Status, utils::print_warning};
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use std::{
    collections::BTreeSet,
    fmt,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// One of the independent analyses the orchestrator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisKind {
    /// Info.plist manifest decoding.
    Manifest,
    /// File inventory of the bundle tree.
    Files,
    /// Code rule engine over the source tree.
    Code,
    /// Mach-O decoding plus hardening checks on the executable.
    Binary,
    /// File reputation lookup by content hash.
    Reputation,
    /// App store metadata lookup by bundle identifier.
    Store,
}

impl AnalysisKind {
    /// All the analysis kinds, in a fixed order.
    pub fn all() -> BTreeSet<Self> {
        [
            Self::Manifest,
            Self::Files,
            Self::Code,
            Self::Binary,
            Self::Reputation,
            Self::Store,
        ]
        .iter()
        .cloned()
        .collect()
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manifest => "manifest",
            Self::Files => "files",
            Self::Code => "code",
            Self::Binary => "binary",
            Self::Reputation => "reputation",
            Self::Store => "store",
        };
        write!(f, "{}", name)
    }
}

impl serde::Serialize for AnalysisKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manifest" => Ok(Self::Manifest),
            "files" => Ok(Self::Files),
            "code" => Ok(Self::Code),
            "binary" => Ok(Self::Binary),
            "reputation" => Ok(Self::Reputation),
            "store" => Ok(Self::Store),
            _ => bail!("unknown analysis kind `{}`", s),
        }
    }
}

/// Optional values loaded from a `config.toml` file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    threads: Option<usize>,
    rules_json: Option<PathBuf>,
    results_folder: Option<PathBuf>,
    country: Option<String>,
    reputation_api_key: Option<String>,
    reputation_url: Option<String>,
    store_url: Option<String>,
    domain_list_url: Option<String>,
    request_timeout: Option<u64>,
    min_status: Option<Status>,
}

/// Analyzer configuration, one per scan invocation.
///
/// The orchestrator clones it once per analysis task so that no task shares
/// mutable state with another.
#[derive(Debug, Clone)]
pub struct Config {
    app_path: PathBuf,
    source: bool,
    source_path: Option<PathBuf>,
    analyses: BTreeSet<AnalysisKind>,
    country: String,
    reputation_api_key: Option<String>,
    reputation_url: String,
    store_url: String,
    domain_list_url: String,
    request_timeout: u64,
    threads: usize,
    rules_json: PathBuf,
    results_folder: PathBuf,
    min_status: Status,
    verbose: bool,
    quiet: bool,
    force: bool,
    bench: bool,
    loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_path: PathBuf::new(),
            source: false,
            source_path: None,
            analyses: AnalysisKind::all(),
            country: String::from("us"),
            reputation_api_key: None,
            reputation_url: String::from("https://www.virustotal.com/vtapi/v2/file"),
            store_url: String::from("https://itunes.apple.com/lookup"),
            domain_list_url: String::from(
                "https://www.malwaredomainlist.com/hostslist/hosts.txt",
            ),
            request_timeout: 30,
            threads: num_cpus::get(),
            rules_json: PathBuf::from("rules.json"),
            results_folder: PathBuf::from("results"),
            min_status: Status::Info,
            verbose: false,
            quiet: false,
            force: false,
            bench: false,
            loaded_files: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from the given TOML file on top of the
    /// default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::default();
        let toml = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("could not read the config file {}", path.as_ref().display())
        })?;
        let file: ConfigFile = toml::from_str(&toml).with_context(|| {
            format!(
                "could not parse the config file {}",
                path.as_ref().display()
            )
        })?;

        if let Some(threads) = file.threads {
            if threads == 0 {
                print_warning(
                    "the `threads` option in the config file must be bigger than 0, using default",
                );
            } else {
                config.threads = threads;
            }
        }
        if let Some(rules_json) = file.rules_json {
            config.rules_json = rules_json;
        }
        if let Some(results_folder) = file.results_folder {
            config.results_folder = results_folder;
        }
        if let Some(country) = file.country {
            config.country = country;
        }
        if let Some(key) = file.reputation_api_key {
            config.reputation_api_key = Some(key);
        }
        if let Some(url) = file.reputation_url {
            config.reputation_url = url;
        }
        if let Some(url) = file.store_url {
            config.store_url = url;
        }
        if let Some(url) = file.domain_list_url {
            config.domain_list_url = url;
        }
        if let Some(timeout) = file.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(min_status) = file.min_status {
            config.min_status = min_status;
        }

        config.loaded_files.push(path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Decorates the configuration with the command line options.
    pub fn decorate_with_cli(&mut self, cli: &ArgMatches<'static>) -> Result<()> {
        self.verbose = cli.is_present("verbose");
        self.quiet = cli.is_present("quiet");
        self.force = cli.is_present("force");
        self.bench = cli.is_present("bench");
        self.source = cli.is_present("source");

        if let Some(path) = cli.value_of("path") {
            self.app_path = PathBuf::from(path);
        }
        if let Some(path) = cli.value_of("source_path") {
            self.source_path = Some(PathBuf::from(path));
        }
        if let Some(list) = cli.value_of("analyses") {
            let mut analyses = BTreeSet::new();
            for kind in list.split(',') {
                let _ = analyses.insert(AnalysisKind::from_str(kind)?);
            }
            self.analyses = analyses;
        }
        if let Some(country) = cli.value_of("country") {
            self.country = country.to_lowercase();
        }
        if let Some(key) = cli.value_of("api_key") {
            self.reputation_api_key = Some(key.to_owned());
        }
        if let Some(rules) = cli.value_of("rules") {
            self.rules_json = PathBuf::from(rules);
        }
        if let Some(results) = cli.value_of("results") {
            self.results_folder = PathBuf::from(results);
        }
        if let Some(threads) = cli.value_of("threads") {
            self.threads = threads
                .parse::<usize>()
                .context("the `--threads` option must be a positive integer")?;
        }
        if let Some(min_status) = cli.value_of("min_status") {
            self.min_status = Status::from_str(min_status)?;
        }

        Ok(())
    }

    /// Checks if the configuration is valid for starting a scan.
    pub fn check(&self) -> bool {
        self.errors().is_empty()
    }

    /// Gets the list of configuration errors.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.app_path.exists() {
            errors.push(format!(
                "the application path `{}` does not exist",
                self.app_path.display()
            ));
        }
        if self.analyses.contains(&AnalysisKind::Code) && !self.rules_json.exists() {
            errors.push(format!(
                "the rule file `{}` does not exist",
                self.rules_json.display()
            ));
        }
        if self.threads == 0 {
            errors.push(String::from("the thread count must be bigger than 0"));
        }
        errors
    }

    /// Turns the configuration errors into a hard configuration error.
    pub fn into_check_error(&self) -> error::Kind {
        error::Kind::Config {
            message: self.errors().join("; "),
        }
    }

    /// Gets the application artifact path.
    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// Sets the application artifact path.
    pub fn set_app_path<P: AsRef<Path>>(&mut self, path: P) {
        self.app_path = path.as_ref().to_path_buf();
    }

    /// Marks the artifact as a source tree.
    pub fn set_source(&mut self, source: bool) {
        self.source = source;
    }

    /// Sets the additional source tree path.
    pub fn set_source_path<P: AsRef<Path>>(&mut self, path: P) {
        self.source_path = Some(path.as_ref().to_path_buf());
    }

    /// Sets the enabled analyses.
    pub fn set_analyses(&mut self, analyses: BTreeSet<AnalysisKind>) {
        self.analyses = analyses;
    }

    /// Sets the path to the rule file.
    pub fn set_rules_json<P: AsRef<Path>>(&mut self, path: P) {
        self.rules_json = path.as_ref().to_path_buf();
    }

    /// Sets the reputation service API key.
    pub fn set_reputation_api_key<S: Into<String>>(&mut self, key: S) {
        self.reputation_api_key = Some(key.into());
    }

    /// Returns `true` if the artifact is a source tree instead of a
    /// compiled bundle.
    pub fn is_source(&self) -> bool {
        self.source
    }

    /// Gets the additional source tree path, if any.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Gets the set of enabled analyses.
    pub fn analyses(&self) -> &BTreeSet<AnalysisKind> {
        &self.analyses
    }

    /// Gets the store country code.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Gets the reputation service API key, if configured.
    pub fn reputation_api_key(&self) -> Option<&str> {
        self.reputation_api_key.as_deref()
    }

    /// Gets the reputation service base URL.
    pub fn reputation_url(&self) -> &str {
        &self.reputation_url
    }

    /// Gets the store lookup base URL.
    pub fn store_url(&self) -> &str {
        &self.store_url
    }

    /// Gets the malware domain list URL.
    pub fn domain_list_url(&self) -> &str {
        &self.domain_list_url
    }

    /// Gets the timeout for network requests, in seconds.
    pub fn request_timeout(&self) -> u64 {
        self.request_timeout
    }

    /// Gets the number of threads for the code analysis.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Gets the path to the rule file.
    pub fn rules_json(&self) -> &Path {
        &self.rules_json
    }

    /// Gets the results folder.
    pub fn results_folder(&self) -> &Path {
        &self.results_folder
    }

    /// Gets the minimum status for code rules to be checked.
    pub fn min_status(&self) -> Status {
        self.min_status
    }

    /// Returns `true` if the analyzer runs in verbose mode.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Returns `true` if the analyzer runs in quiet mode.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Returns `true` if previous results should be overwritten.
    pub fn is_force(&self) -> bool {
        self.force
    }

    /// Returns `true` if benchmarks should be printed.
    pub fn is_bench(&self) -> bool {
        self.bench
    }

    /// Gets the configuration files that were loaded.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }
}
