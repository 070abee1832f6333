//! Bundle normalization.
//!
//! Unwraps whatever artifact the user points the analyzer at (an `.ipa` or
//! `.zip` archive, an exploded `.app` bundle, a folder containing one, or a
//! source tree) into a canonical temporary layout that the analyzers can
//! rely on. Temporary directories are owned by the returned
//! [`NormalizedBundle`] and removed when it goes out of scope, on every
//! exit path.

use crate::{config::Config, error, utils::print_warning};
use anyhow::{Context, Result};
use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

/// Archive extensions the normalizer knows how to extract.
const ARCHIVE_EXTENSIONS: &[&str] = &["ipa", "zip"];
/// Extension of an exploded application bundle.
const BUNDLE_EXTENSION: &str = "app";

/// Canonical layout of a normalized scan input.
///
/// Dropping this struct removes every temporary directory the
/// normalization created.
#[derive(Debug)]
pub struct NormalizedBundle {
    binary_root: Option<PathBuf>,
    source_root: Option<PathBuf>,
    binary_tmp: Option<TempDir>,
    source_tmp: Option<TempDir>,
}

impl NormalizedBundle {
    /// Gets the root known to contain exactly one `.app` bundle, if the
    /// scan has a compiled artifact.
    pub fn binary_root(&self) -> Option<&Path> {
        self.binary_root.as_deref()
    }

    /// Gets the root of the source tree, if the scan has one.
    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }
}

/// Normalizes the scan input described by the configuration.
///
/// Extraction failures and inputs where no recognizable bundle can be
/// found are fatal to the scan. Temporary directories created before the
/// failure are removed by their drop guards.
pub fn normalize(config: &Config) -> Result<NormalizedBundle> {
    let mut normalized = NormalizedBundle {
        binary_root: None,
        source_root: None,
        binary_tmp: None,
        source_tmp: None,
    };

    if config.is_source() {
        let (root, tmp) = normalize_source(config.app_path())?;
        normalized.source_root = Some(root);
        normalized.source_tmp = tmp;
    } else {
        let (root, tmp) = normalize_binary(config.app_path())?;
        normalized.binary_root = Some(root);
        normalized.binary_tmp = tmp;

        if let Some(source) = config.source_path() {
            let (root, tmp) = normalize_source(source)?;
            normalized.source_root = Some(root);
            normalized.source_tmp = tmp;
        }
    }

    Ok(normalized)
}

/// Normalizes a compiled artifact into a directory containing one `.app`
/// bundle.
fn normalize_binary(path: &Path) -> Result<(PathBuf, Option<TempDir>)> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some(ext) if ARCHIVE_EXTENSIONS.contains(&ext) => {
            let tmp = TempDir::new().context("could not create a temporary directory")?;
            extract_archive(path, tmp.path())?;
            let root = descend_single_dir(tmp.path(), path.file_stem());
            Ok((root, Some(tmp)))
        }
        Some(ext) if ext == BUNDLE_EXTENSION => {
            // Never analyze the bundle in place: the parent directory may
            // contain sibling artifacts.
            let tmp = TempDir::new().context("could not create a temporary directory")?;
            let name = path
                .file_name()
                .context("the bundle path has no file name")?;
            copy_folder(path, &tmp.path().join(name))?;
            Ok((tmp.path().to_path_buf(), Some(tmp)))
        }
        None if path.is_dir() => {
            let found = find_artifact(path).ok_or_else(|| error::Kind::BundleNotFound {
                path: path.to_path_buf(),
            })?;
            normalize_binary(&found)
        }
        _ => Err(error::Kind::UnsupportedInput {
            path: path.to_path_buf(),
        }
        .into()),
    }
}

/// Normalizes a source artifact.
fn normalize_source(path: &Path) -> Result<(PathBuf, Option<TempDir>)> {
    if path.is_dir() {
        let mut root = path.to_path_buf();
        loop {
            let mut children = Vec::new();
            for child in fs::read_dir(&root)? {
                children.push(child?.path());
            }
            if children.len() != 1 {
                break;
            }
            let child = children.remove(0);
            if child.is_dir() {
                root = child;
            } else if is_archive(&child) {
                return extract_source_archive(&child);
            } else {
                break;
            }
        }
        Ok((root, None))
    } else if is_archive(path) {
        extract_source_archive(path)
    } else {
        Err(error::Kind::UnsupportedInput {
            path: path.to_path_buf(),
        }
        .into())
    }
}

/// Extracts a source archive into its own temporary directory.
fn extract_source_archive(path: &Path) -> Result<(PathBuf, Option<TempDir>)> {
    let tmp = TempDir::new().context("could not create a temporary directory")?;
    extract_archive(path, tmp.path())?;
    let root = descend_single_dir(tmp.path(), path.file_stem());
    Ok((root, Some(tmp)))
}

/// Returns `true` if the path has a known archive extension.
fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map_or(false, |ext| {
            ARCHIVE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
}

/// Searches the directory, depth first, for the first recognizable bundle
/// or archive.
fn find_artifact(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.depth() > 0
                && entry
                    .path()
                    .extension()
                    .and_then(OsStr::to_str)
                    .map_or(false, |ext| {
                        let ext = ext.to_lowercase();
                        ARCHIVE_EXTENSIONS.contains(&ext.as_str()) || ext == BUNDLE_EXTENSION
                    })
        })
        .map(|entry| entry.into_path())
}

/// Extracts the given ZIP archive into the destination directory.
fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("could not open the archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("could not read the archive {}", archive.display()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                print_warning(format!(
                    "skipping archive entry with a suspicious path: {}",
                    entry.name()
                ));
                continue;
            }
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&out_path)?;
            let _ = io::copy(&mut entry, &mut out)?;
        }
    }

    Ok(())
}

/// If extraction produced a single nested directory named like the archive,
/// descends into it.
fn descend_single_dir(root: &Path, stem: Option<&OsStr>) -> PathBuf {
    if let (Some(stem), Ok(entries)) = (stem, fs::read_dir(root)) {
        let children: Vec<_> = entries.filter_map(|entry| entry.ok()).collect();
        if children.len() == 1 {
            let child = children[0].path();
            if child.is_dir() && child.file_name() == Some(stem) {
                return child;
            }
        }
    }
    root.to_path_buf()
}

/// Copies the contents of `from` to `to`.
///
/// If the destination folder doesn't exist it is created. Files in the
/// destination folder with the same name as in the origin folder are
/// overwritten.
pub fn copy_folder<P: AsRef<Path>>(from: P, to: P) -> Result<()> {
    if !to.as_ref().exists() {
        fs::create_dir_all(to.as_ref())?;
    }

    for f in fs::read_dir(from.as_ref())? {
        let f = f?;
        if f.path().is_dir() {
            copy_folder(f.path(), to.as_ref().join(f.file_name()))?;
        } else {
            let _ = fs::copy(f.path(), to.as_ref().join(f.file_name()))?;
        }
    }
    Ok(())
}

/// Locates the single `.app` bundle inside the normalized binary root.
pub fn find_app_dir(binary_root: &Path) -> Result<PathBuf> {
    WalkDir::new(binary_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.file_type().is_dir()
                && entry
                    .path()
                    .extension()
                    .and_then(OsStr::to_str)
                    .map_or(false, |ext| ext.eq_ignore_ascii_case(BUNDLE_EXTENSION))
        })
        .map(|entry| entry.into_path())
        .ok_or_else(|| {
            error::Kind::BundleNotFound {
                path: binary_root.to_path_buf(),
            }
            .into()
        })
}

/// Locates the main executable inside an `.app` bundle.
///
/// The executable is the file named after the bundle itself.
pub fn find_executable(app_dir: &Path) -> Result<PathBuf> {
    let stem = app_dir
        .file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| error::Kind::ExecutableNotFound {
            path: app_dir.to_path_buf(),
        })?;

    let executable = app_dir.join(stem);
    if executable.is_file() {
        Ok(executable)
    } else {
        Err(error::Kind::ExecutableNotFound {
            path: app_dir.to_path_buf(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::{find_app_dir, find_executable, normalize};
    use crate::config::Config;
    use std::{fs, io::Write, path::Path};

    /// Writes a minimal `.ipa`-shaped archive to the given path.
    fn write_sample_archive(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let options = zip::write::FileOptions::default();
        let mut zip = zip::ZipWriter::new(file);
        zip.add_directory("Payload/Demo.app/", options).unwrap();
        zip.start_file("Payload/Demo.app/Info.plist", options)
            .unwrap();
        zip.write_all(b"<plist><dict></dict></plist>").unwrap();
        zip.start_file("Payload/Demo.app/Demo", options).unwrap();
        zip.write_all(b"\xfe\xed\xfa\xce").unwrap();
        zip.finish().unwrap();
    }

    fn config_for(path: &Path) -> Config {
        let mut config = Config::default();
        config.set_app_path(path);
        config
    }

    #[test]
    fn it_normalizes_an_ipa_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("demo.ipa");
        write_sample_archive(&archive);

        let normalized = normalize(&config_for(&archive)).unwrap();
        let root = normalized.binary_root().unwrap();
        let app = find_app_dir(root).unwrap();
        assert_eq!(app.file_name().unwrap().to_str().unwrap(), "Demo.app");
        assert!(find_executable(&app).is_ok());
    }

    #[test]
    fn it_normalizes_a_zip_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("demo.zip");
        write_sample_archive(&archive);

        let normalized = normalize(&config_for(&archive)).unwrap();
        assert!(find_app_dir(normalized.binary_root().unwrap()).is_ok());
    }

    #[test]
    fn it_normalizes_an_exploded_app_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("Demo.app");
        fs::create_dir(&app).unwrap();
        fs::write(app.join("Info.plist"), "<plist/>").unwrap();
        fs::write(app.join("Demo"), b"\xfe\xed\xfa\xce").unwrap();

        let normalized = normalize(&config_for(&app)).unwrap();
        let root = normalized.binary_root().unwrap();
        // The bundle must have been copied out of its parent directory.
        assert_ne!(root, dir.path());
        let found = find_app_dir(root).unwrap();
        assert_eq!(found.file_name().unwrap().to_str().unwrap(), "Demo.app");
    }

    #[test]
    fn it_searches_directories_for_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("downloads").join("extracted");
        fs::create_dir_all(&nested).unwrap();
        let archive = nested.join("demo.ipa");
        write_sample_archive(&archive);

        let normalized = normalize(&config_for(dir.path())).unwrap();
        assert!(find_app_dir(normalized.binary_root().unwrap()).is_ok());
    }

    #[test]
    fn it_rejects_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("demo.apk");
        fs::write(&artifact, b"PK").unwrap();

        assert!(normalize(&config_for(&artifact)).is_err());
    }

    #[test]
    fn it_removes_temporary_directories_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("demo.ipa");
        write_sample_archive(&archive);

        let normalized = normalize(&config_for(&archive)).unwrap();
        let root = normalized.binary_root().unwrap().to_path_buf();
        assert!(root.exists());
        drop(normalized);
        assert!(!root.exists());
    }

    #[test]
    fn it_descends_single_child_source_directories() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("wrapper").join("DemoApp");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("main.swift"), "print(1)").unwrap();

        let mut config = Config::default();
        config.set_app_path(&dir.path().join("wrapper"));
        config.set_source(true);

        let normalized = normalize(&config).unwrap();
        assert_eq!(normalized.source_root().unwrap(), project.as_path());
    }
}
