//! File inventory of the application bundle.

use crate::{
    config::Config,
    utils::{print_warning, sanitize_filename},
};
use anyhow::Result;
use std::{ffi::OsStr, path::Path};
use walkdir::WalkDir;

/// Extensions of certificate and provisioning files.
const CERTIFICATE_EXTENSIONS: &[&str] = &[
    "cer",
    "pem",
    "cert",
    "crt",
    "der",
    "p12",
    "mobileprovision",
];
/// Extensions of embedded database files.
const DATABASE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlitedb", "sqlite3"];
/// Extension of property list files.
const PLIST_EXTENSION: &str = "plist";

/// Files of interest found inside the bundle tree.
#[derive(Debug, Default, Serialize)]
pub struct FileInventory {
    certificates: Vec<String>,
    databases: Vec<String>,
    plists: Vec<String>,
}

impl FileInventory {
    /// Gets the certificate and provisioning files.
    pub fn certificates(&self) -> &[String] {
        &self.certificates
    }

    /// Gets the embedded database files.
    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    /// Gets the property list files.
    pub fn plists(&self) -> &[String] {
        &self.plists
    }

    /// Returns `true` if nothing of interest was found.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.databases.is_empty() && self.plists.is_empty()
    }
}

/// Walks the bundle tree and classifies the files of interest.
///
/// Filenames containing characters the external tooling cannot consume are
/// renamed on the way, so the inventory reports the sanitized names.
pub fn analysis(config: &Config, root: &Path) -> Result<FileInventory> {
    let mut inventory = FileInventory::default();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = match sanitize_filename(entry.path()) {
            Ok(path) => path,
            Err(e) => {
                print_warning(format!(
                    "could not sanitize the file name `{}`: {}",
                    entry.path().display(),
                    e
                ));
                entry.path().to_path_buf()
            }
        };

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        match path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
            .as_deref()
        {
            Some(ext) if CERTIFICATE_EXTENSIONS.contains(&ext) => {
                inventory.certificates.push(relative)
            }
            Some(ext) if DATABASE_EXTENSIONS.contains(&ext) => inventory.databases.push(relative),
            Some(PLIST_EXTENSION) => inventory.plists.push(relative),
            _ => {}
        }
    }

    inventory.certificates.sort();
    inventory.databases.sort();
    inventory.plists.sort();

    if config.is_verbose() {
        println!(
            "File inventory finished: {} certificates, {} databases, {} property lists.",
            inventory.certificates.len(),
            inventory.databases.len(),
            inventory.plists.len()
        );
    } else if !config.is_quiet() {
        println!("Files analyzed.");
    }

    Ok(inventory)
}
