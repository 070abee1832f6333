//! Module containing the definition of error types.

use std::path::PathBuf;
use thiserror::Error;

/// Enumeration of the different error kinds.
///
/// Only conditions that are fatal, either to the whole scan or to one
/// analysis task, get a variant here. "Not found" results inside the rule
/// engine and the tool output parser are findings, not errors.
#[derive(Debug, Error)]
pub enum Kind {
    /// The input artifact has an extension the normalizer does not know.
    #[error("unsupported input artifact: {}", path.display())]
    UnsupportedInput {
        /// Path given by the user.
        path: PathBuf,
    },
    /// No recognizable application bundle was found inside the input.
    #[error("no recognizable application bundle found in {}", path.display())]
    BundleNotFound {
        /// Path that was searched.
        path: PathBuf,
    },
    /// The app bundle has no executable matching its name.
    #[error("no executable found inside the app bundle {}", path.display())]
    ExecutableNotFound {
        /// Path of the app bundle.
        path: PathBuf,
    },
    /// The Info.plist manifest could not be located.
    #[error("the Info.plist manifest could not be located")]
    ManifestNotFound,
    /// The executable starts with an unknown magic number.
    #[error("unknown Mach-O magic number: {magic:#010x}")]
    UnknownMagic {
        /// Magic number read from the header.
        magic: u32,
    },
    /// The executable declares a CPU type with no known mapping.
    #[error("unknown Mach-O CPU type code: {cpu_type:#010x}")]
    UnknownCpuType {
        /// Raw CPU type code read from the header.
        cpu_type: u32,
    },
    /// An external disassembly tool could not be executed.
    #[error("the `{tool}` tool could not be run: {message}")]
    ToolFailed {
        /// Name of the tool.
        tool: String,
        /// Captured error output or spawn error.
        message: String,
    },
    /// Configuration error.
    #[error("there was an error in the configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}
