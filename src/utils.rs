//! Utility functions shared by the analysis modules.

use crate::status::Status;
use anyhow::Result;
use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use sha2::{Digest, Sha256};
use std::{
    env,
    ffi::OsStr,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// Initializes the global logger.
///
/// Errors and warnings get colored prefixes, everything else is printed
/// verbatim. The `RUST_LOG` environment variable takes precedence over the
/// verbosity flag.
pub fn initialize_logger(is_verbose: bool) {
    let log_level = if is_verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    let _ = builder.format(|buf, record| match record.level() {
        Level::Warn => writeln!(
            buf,
            "{}{}",
            "Warning: ".bold().yellow(),
            record.args().to_string().yellow()
        ),
        Level::Error => writeln!(
            buf,
            "{}{}",
            "Error: ".bold().red(),
            record.args().to_string().red()
        ),
        Level::Debug => writeln!(buf, "{}{}", "Debug: ".bold(), record.args()),
        _ => writeln!(buf, "{}", record.args()),
    });

    let builder_state = if let Ok(env_log) = env::var("RUST_LOG") {
        builder.parse_filters(&env_log).try_init()
    } else {
        builder
            .filter(Some("sira_analyzer_core"), log_level)
            .try_init()
    };

    if let Err(e) = builder_state {
        println!("Could not initialize logger: {}", e);
    }
}

/// Prints the given error to `stderr`.
pub fn print_error<S: AsRef<str>>(error: S) {
    error!("{}", error.as_ref());
}

/// Prints the given warning to `stderr`.
pub fn print_warning<S: AsRef<str>>(warning: S) {
    warn!("{}", warning.as_ref());
}

/// Prints a found issue to the console, colored by its status.
pub fn print_finding<S: AsRef<str>>(text: S, status: Status) {
    let text = text.as_ref();
    let start = format!("{} status issue found!:", status);
    let (start, message) = match status {
        Status::Info => (start.cyan(), text.cyan()),
        Status::Warning => (start.yellow(), text.yellow()),
        Status::Insecure => (start.red(), text.red()),
        Status::Secure => return,
    };
    println!("{} {}", start, message);
}

/// MD5, SHA-1 and SHA-256 hex digests of the input artifact.
///
/// The SHA-256 digest keys the reputation lookup.
#[derive(Debug, Clone, Serialize)]
pub struct FingerPrint {
    md5: String,
    sha1: String,
    sha256: String,
}

impl FingerPrint {
    /// Creates a new fingerprint by hashing the file at the given path.
    pub fn new<P: AsRef<Path>>(artifact: P) -> Result<Self> {
        let buffer = fs::read(artifact)?;

        Ok(Self {
            md5: format!("{:x}", md5::compute(&buffer)),
            sha1: sha1::Sha1::from(&buffer).digest().to_string(),
            sha256: hex::encode(Sha256::digest(&buffer)),
        })
    }

    /// Gets the SHA-256 hex digest.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Renames the file if its name contains characters that break the external
/// tooling, returning the effective path.
///
/// Note that this mutates the tree being analyzed: a file named
/// `View Controller.swift` is renamed to `View_Controller.swift` on disk
/// before it is read.
pub fn sanitize_filename<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    match path.file_name().and_then(OsStr::to_str) {
        Some(name) if name.contains(' ') => {
            let sanitized = path.with_file_name(name.replace(' ', "_"));
            fs::rename(path, &sanitized)?;
            Ok(sanitized)
        }
        _ => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_filename, FingerPrint};
    use std::fs;

    #[test]
    fn it_fingerprints_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        fs::write(&path, b"abc").unwrap();

        let fingerprint = FingerPrint::new(&path).unwrap();
        assert_eq!(
            fingerprint.sha256(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn it_sanitizes_filenames_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("View Controller.swift");
        fs::write(&path, "let x = 1").unwrap();

        let sanitized = sanitize_filename(&path).unwrap();
        assert_eq!(
            sanitized.file_name().unwrap().to_str().unwrap(),
            "View_Controller.swift"
        );
        assert!(!path.exists());
        assert!(sanitized.exists());
    }

    #[test]
    fn it_leaves_clean_filenames_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AppDelegate.swift");
        fs::write(&path, "let x = 1").unwrap();

        let sanitized = sanitize_filename(&path).unwrap();
        assert_eq!(sanitized, path);
        assert!(path.exists());
    }
}
