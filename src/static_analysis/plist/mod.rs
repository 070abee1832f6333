//! Module containing the manifest analysis logic.
//!
//! The `Info.plist` manifest is an XML property list. A small recursive
//! parser turns it into a [`PlistValue`] tree, from which the app
//! identity, URL schemes, permission usage descriptions and App Transport
//! Security policy are extracted.


use crate::{config::Config, error};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use quick_xml::{events::Event, Reader};
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Usage description keys and the capability each one unlocks.
const USAGE_DESCRIPTIONS: [(&str, &str); 16] = [
    ("NSAppleMusicUsageDescription", "Media library"),
    ("NSBluetoothPeripheralUsageDescription", "Bluetooth"),
    ("NSCalendarsUsageDescription", "Calendars"),
    ("NSCameraUsageDescription", "Camera"),
    ("NSContactsUsageDescription", "Contacts"),
    ("NSFaceIDUsageDescription", "Face ID"),
    ("NSHealthShareUsageDescription", "Health data (read)"),
    ("NSHealthUpdateUsageDescription", "Health data (write)"),
    ("NSHomeKitUsageDescription", "HomeKit"),
    ("NSLocationAlwaysUsageDescription", "Location (always)"),
    ("NSLocationWhenInUseUsageDescription", "Location (when in use)"),
    ("NSMicrophoneUsageDescription", "Microphone"),
    ("NSMotionUsageDescription", "Motion"),
    ("NSPhotoLibraryUsageDescription", "Photo library"),
    ("NSRemindersUsageDescription", "Reminders"),
    ("NSSpeechRecognitionUsageDescription", "Speech recognition"),
];

/// Performs the manifest analysis.
///
/// The location strategy depends on the artifact kind: compiled bundles
/// carry the manifest directly inside their `.app` directory, source trees
/// are walked until both the project descriptor and the manifest are
/// found.
pub fn analysis(
    config: &Config,
    binary_root: Option<&Path>,
    source_root: Option<&Path>,
) -> Result<ManifestInfo> {
    if config.is_verbose() {
        println!(
            "Loading the manifest file. For this, we first locate the document and then we'll \
             analyze it."
        )
    }

    let (plist_path, app_name) = if let Some(binary_root) = binary_root {
        locate_in_bundle(binary_root)?
    } else if let Some(source_root) = source_root {
        locate_in_source(source_root)?
    } else {
        return Err(error::Kind::ManifestNotFound.into());
    };

    let xml = fs::read_to_string(&plist_path).with_context(|| {
        format!("could not read the manifest {}", plist_path.display())
    })?;
    let root = parse_plist(&xml).context("could not parse the Info.plist manifest")?;
    let manifest = ManifestInfo::from_plist(app_name, &root);

    if config.is_verbose() {
        println!("{}", "The manifest was loaded successfully!".green());
        println!();
    } else if !config.is_quiet() {
        println!("Manifest analyzed.");
    }

    Ok(manifest)
}

/// Locates the manifest inside a compiled bundle: it sits directly inside
/// the single `.app` directory.
fn locate_in_bundle(binary_root: &Path) -> Result<(PathBuf, String)> {
    let app = crate::bundle::find_app_dir(binary_root)?;
    let app_name = app
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_owned();
    let plist = app.join("Info.plist");
    if plist.is_file() {
        Ok((plist, app_name))
    } else {
        Err(error::Kind::ManifestNotFound.into())
    }
}

/// Locates the manifest inside a source tree.
///
/// The walk stops as soon as both the project descriptor (which names the
/// app) and the manifest have been seen.
fn locate_in_source(source_root: &Path) -> Result<(PathBuf, String)> {
    let mut app_name: Option<String> = None;
    let mut plist: Option<PathBuf> = None;

    for entry in WalkDir::new(source_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        let path = entry.path();
        if app_name.is_none()
            && path
                .extension()
                .and_then(OsStr::to_str)
                .map_or(false, |ext| ext.eq_ignore_ascii_case("xcodeproj"))
        {
            app_name = path
                .file_stem()
                .and_then(OsStr::to_str)
                .map(str::to_owned);
        }
        if plist.is_none()
            && entry.file_type().is_file()
            && entry.file_name() == OsStr::new("Info.plist")
        {
            plist = Some(path.to_path_buf());
        }
        if app_name.is_some() && plist.is_some() {
            break;
        }
    }

    let plist = plist.ok_or(error::Kind::ManifestNotFound)?;
    let app_name = app_name.unwrap_or_else(|| {
        source_root
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_owned()
    });

    Ok((plist, app_name))
}

/// Manifest analysis representation structure.
#[derive(Debug, Default, Serialize)]
pub struct ManifestInfo {
    app_name: String,
    executable: String,
    bundle_id: String,
    version: String,
    build: String,
    display_name: String,
    sdk_name: String,
    platform_version: String,
    min_os_version: String,
    url_schemes: Vec<String>,
    permissions: Vec<Permission>,
    transport: InsecureTransport,
}

impl ManifestInfo {
    /// Builds the manifest information from a parsed property list.
    fn from_plist(app_name: String, root: &PlistValue) -> Self {
        let string = |key: &str| {
            root.get(key)
                .and_then(PlistValue::as_str)
                .unwrap_or_default()
                .to_owned()
        };

        let mut url_schemes = Vec::new();
        if let Some(types) = root.get("CFBundleURLTypes").and_then(PlistValue::as_array) {
            for url_type in types {
                if let Some(schemes) = url_type
                    .get("CFBundleURLSchemes")
                    .and_then(PlistValue::as_array)
                {
                    url_schemes.extend(
                        schemes
                            .iter()
                            .filter_map(PlistValue::as_str)
                            .map(str::to_owned),
                    );
                }
            }
        }

        let mut permissions = Vec::new();
        for &(key, name) in &USAGE_DESCRIPTIONS {
            if let Some(description) = root.get(key).and_then(PlistValue::as_str) {
                if !description.is_empty() {
                    permissions.push(Permission {
                        key: key.to_owned(),
                        name: name.to_owned(),
                        description: description.to_owned(),
                    });
                }
            }
        }

        let transport = root
            .get("NSAppTransportSecurity")
            .map(InsecureTransport::from_plist)
            .unwrap_or_default();

        Self {
            app_name,
            executable: string("CFBundleExecutable"),
            bundle_id: string("CFBundleIdentifier"),
            version: string("CFBundleShortVersionString"),
            build: string("CFBundleVersion"),
            display_name: string("CFBundleDisplayName"),
            sdk_name: string("DTSDKName"),
            platform_version: string("DTPlatformVersion"),
            min_os_version: string("MinimumOSVersion"),
            url_schemes,
            permissions,
            transport,
        }
    }

    /// Gets the application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Gets the executable name.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Gets the bundle identifier.
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Gets the short version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Gets the build number string.
    pub fn build(&self) -> &str {
        &self.build
    }

    /// Gets the declared URL schemes.
    pub fn url_schemes(&self) -> &[String] {
        &self.url_schemes
    }

    /// Gets the declared permissions.
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Gets the App Transport Security summary.
    pub fn transport(&self) -> &InsecureTransport {
        &self.transport
    }
}

/// A permission the application declares, with its usage description.
#[derive(Debug, Clone, Serialize)]
pub struct Permission {
    key: String,
    name: String,
    description: String,
}

impl Permission {
    /// Gets the raw usage description key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Gets the human readable capability name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the usage description string.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// App Transport Security summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct InsecureTransport {
    allows_arbitrary_loads: bool,
    exception_domains: Vec<String>,
}

impl InsecureTransport {
    /// Builds the summary from the `NSAppTransportSecurity` dictionary.
    ///
    /// Every key of `NSExceptionDomains` is collected, without inspecting
    /// the per-domain sub-flags: a domain listed only for subdomain
    /// inclusion is reported too.
    fn from_plist(ats: &PlistValue) -> Self {
        let allows_arbitrary_loads = ats
            .get("NSAllowsArbitraryLoads")
            .and_then(PlistValue::as_bool)
            .unwrap_or(false);

        let exception_domains = ats
            .get("NSExceptionDomains")
            .and_then(PlistValue::as_dict)
            .map(|entries| entries.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default();

        Self {
            allows_arbitrary_loads,
            exception_domains,
        }
    }

    /// Returns `true` if the global "allow arbitrary loads" flag is set.
    pub fn allows_arbitrary_loads(&self) -> bool {
        self.allows_arbitrary_loads
    }

    /// Gets the flagged exception domains.
    pub fn exception_domains(&self) -> &[String] {
        &self.exception_domains
    }
}

/// A parsed property list value.
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    /// Dictionary, with its entries in document order.
    Dict(Vec<(String, PlistValue)>),
    /// Array of values.
    Array(Vec<PlistValue>),
    /// String value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Boolean value.
    Boolean(bool),
}

impl PlistValue {
    /// Looks a key up, if the value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Dict(entries) => entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Gets the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Gets the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Gets the value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Gets the dictionary entries, if the value is a dictionary.
    pub fn as_dict(&self) -> Option<&[(String, Self)]> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Parses an XML property list into its root value.
pub fn parse_plist(xml: &str) -> Result<PlistValue> {
    let mut reader = Reader::from_str(xml);
    let _ = reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name() {
                b"plist" => {}
                name => {
                    let name = name.to_vec();
                    return read_value(&mut reader, &name);
                }
            },
            Ok(Event::Empty(ref e)) => {
                let name = e.name().to_vec();
                return empty_value(&name);
            }
            Ok(Event::Eof) => bail!("the property list has no root value"),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }
}

/// Reads the value whose start tag has just been consumed.
fn read_value(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<PlistValue> {
    match tag {
        b"dict" => read_dict(reader),
        b"array" => read_array(reader),
        b"string" => Ok(PlistValue::String(read_text(reader, b"string")?)),
        b"integer" => {
            let text = read_text(reader, b"integer")?;
            Ok(PlistValue::Integer(text.trim().parse().with_context(
                || format!("invalid integer in property list: {}", text),
            )?))
        }
        b"real" => {
            let text = read_text(reader, b"real")?;
            Ok(PlistValue::Real(text.trim().parse().with_context(
                || format!("invalid real in property list: {}", text),
            )?))
        }
        other => bail!(
            "unexpected property list element `{}`",
            String::from_utf8_lossy(other)
        ),
    }
}

/// Builds the value for a self-closing element.
fn empty_value(tag: &[u8]) -> Result<PlistValue> {
    match tag {
        b"true" => Ok(PlistValue::Boolean(true)),
        b"false" => Ok(PlistValue::Boolean(false)),
        b"string" => Ok(PlistValue::String(String::new())),
        b"dict" => Ok(PlistValue::Dict(Vec::new())),
        b"array" => Ok(PlistValue::Array(Vec::new())),
        other => bail!(
            "unexpected empty property list element `{}`",
            String::from_utf8_lossy(other)
        ),
    }
}

/// Reads dictionary entries until the closing tag.
fn read_dict(reader: &mut Reader<&[u8]>) -> Result<PlistValue> {
    let mut entries = Vec::new();
    let mut pending_key: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().to_vec();
                if name.as_slice() == b"key" {
                    pending_key = Some(read_text(reader, b"key")?);
                } else {
                    let key = match pending_key.take() {
                        Some(key) => key,
                        None => bail!("dictionary value without a key"),
                    };
                    let value = read_value(reader, &name)?;
                    entries.push((key, value));
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name().to_vec();
                let key = match pending_key.take() {
                    Some(key) => key,
                    None => bail!("dictionary value without a key"),
                };
                entries.push((key, empty_value(&name)?));
            }
            Ok(Event::End(ref e)) => {
                if e.name() == b"dict" {
                    break;
                }
            }
            Ok(Event::Eof) => bail!("unexpected end of the property list"),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    Ok(PlistValue::Dict(entries))
}

/// Reads array values until the closing tag.
fn read_array(reader: &mut Reader<&[u8]>) -> Result<PlistValue> {
    let mut values = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().to_vec();
                values.push(read_value(reader, &name)?);
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name().to_vec();
                values.push(empty_value(&name)?);
            }
            Ok(Event::End(ref e)) => {
                if e.name() == b"array" {
                    break;
                }
            }
            Ok(Event::Eof) => bail!("unexpected end of the property list"),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    Ok(PlistValue::Array(values))
}

/// Reads the character data up to the given closing tag.
fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event(&mut buf) {
            Ok(Event::Text(ref e)) => text.push_str(&e.unescape_and_decode(reader)?),
            Ok(Event::End(ref e)) => {
                if e.name() == end {
                    break;
                }
            }
            Ok(Event::Eof) => bail!("unexpected end of the property list"),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    Ok(text)
}
