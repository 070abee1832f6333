//! Binary hardening analysis.
//!
//! The checks run over text captured from an external disassembly utility:
//! a header dump, a symbol/lazy-binding dump and a class listing. Only the
//! parsing lives here; the invocation goes through the [`ToolRunner`]
//! trait so tests can feed canned output.
//!
//! The evaluation order of the checks is fixed and significant: consumers
//! rely on a stable finding count and ordering per dump.

use crate::{
    bundle,
    config::Config,
    error,
    results::findings::{BinaryReport, BinaryType, Finding},
    static_analysis::macho,
    status::Status,
    utils::print_finding,
};
use anyhow::Result;
use regex::Regex;
use std::{path::Path, process::Command};

/// Library name that discriminates Swift binaries from Objective-C ones.
const SWIFT_RUNTIME_LIB: &str = "libswiftCore";

/// Source of the captured disassembly texts for an executable.
pub trait ToolRunner: Send + Sync {
    /// Captured text of the Mach-O header dump.
    fn header_dump(&self, executable: &Path) -> Result<String>;
    /// Captured text of the symbol and lazy binding dump.
    fn symbol_dump(&self, executable: &Path) -> Result<String>;
    /// Captured text of the Objective-C class listing.
    fn class_dump(&self, executable: &Path) -> Result<String>;
}

/// Production tool runner backed by the `otool` utility.
#[derive(Debug, Clone, Copy, Default)]
pub struct Otool;

impl Otool {
    fn run(self, flag: &str, executable: &Path) -> Result<String> {
        let output = Command::new("otool")
            .arg(flag)
            .arg(executable)
            .output()
            .map_err(|e| error::Kind::ToolFailed {
                tool: String::from("otool"),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(error::Kind::ToolFailed {
                tool: String::from("otool"),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ToolRunner for Otool {
    fn header_dump(&self, executable: &Path) -> Result<String> {
        self.run("-hv", executable)
    }

    fn symbol_dump(&self, executable: &Path) -> Result<String> {
        self.run("-Iv", executable)
    }

    fn class_dump(&self, executable: &Path) -> Result<String> {
        self.run("-ov", executable)
    }
}

/// Runs the binary analysis for the bundle under the given root.
pub fn analysis(
    config: &Config,
    tools: &dyn ToolRunner,
    binary_root: &Path,
) -> Result<BinaryReport> {
    let app = bundle::find_app_dir(binary_root)?;
    let executable = bundle::find_executable(&app)?;
    let info = macho::decode(&executable)?;

    let headers = tools.header_dump(&executable)?;
    let symbols = tools.symbol_dump(&executable)?;
    let classes = tools.class_dump(&executable)?;

    let mut findings = header_findings(&headers);
    findings.extend(symbol_findings(&symbols));
    findings.extend(class_findings(&classes));

    for finding in &findings {
        print_finding(finding.description(), finding.status());
    }

    let kind = if symbols.contains(SWIFT_RUNTIME_LIB) {
        BinaryType::Swift
    } else {
        BinaryType::ObjectiveC
    };

    if config.is_verbose() {
        println!(
            "The {} binary was analyzed: {} {}, {}.",
            kind,
            info.word_size(),
            info.cpu(),
            info.endianness()
        );
    } else if !config.is_quiet() {
        println!("Binary analyzed.");
    }

    Ok(BinaryReport::new(info, kind, findings))
}

/// Extracts the findings from a header dump. Always exactly one finding.
pub fn header_findings(text: &str) -> Vec<Finding> {
    let finding = if text.contains("PIE") {
        Finding::new(
            "Position independent executable",
            "The binary is compiled with the PIE flag, so ASLR can randomize its base address.",
            Status::Secure,
            0.0,
            None,
        )
    } else {
        Finding::new(
            "Position independent executable",
            "The binary is not compiled with the PIE flag, which weakens ASLR.",
            Status::Insecure,
            7.4,
            Some("CWE-119"),
        )
    };
    vec![finding]
}

/// Extracts the findings from a symbol dump.
///
/// Always exactly eleven findings: the stack canary and ARC markers,
/// followed by the nine entries of the banned/weak API bank, in that
/// order.
pub fn symbol_findings(text: &str) -> Vec<Finding> {
    let mut findings = Vec::with_capacity(2 + API_CHECKS.len());

    findings.push(if text.contains("stack_chk_guard") {
        Finding::new(
            "Stack smashing protection",
            "The binary has stack canaries in place to mitigate stack overflows.",
            Status::Secure,
            0.0,
            None,
        )
    } else {
        Finding::new(
            "Stack smashing protection",
            "The binary does not have stack canaries, stack overflows may go undetected.",
            Status::Insecure,
            8.1,
            Some("CWE-121"),
        )
    });

    findings.push(if text.contains("_objc_release") {
        Finding::new(
            "Automatic reference counting",
            "The binary is compiled with automatic reference counting.",
            Status::Secure,
            0.0,
            None,
        )
    } else {
        Finding::new(
            "Automatic reference counting",
            "The binary is not compiled with automatic reference counting, memory management \
             bugs become more likely.",
            Status::Insecure,
            6.5,
            Some("CWE-401"),
        )
    });

    for check in API_CHECKS.iter() {
        findings.push(check.evaluate(text));
    }

    findings
}

/// Extracts the findings from a class listing. Always exactly one finding.
pub fn class_findings(text: &str) -> Vec<Finding> {
    let finding = if text.contains("UIWebView") {
        Finding::new(
            "WebView component",
            "The binary uses the deprecated UIWebView component, which does not enforce App \
             Transport Security.",
            Status::Warning,
            5.3,
            Some("CWE-749"),
        )
    } else {
        Finding::new(
            "WebView component",
            "No deprecated WebView component was found in the binary.",
            Status::Secure,
            0.0,
            None,
        )
    };
    vec![finding]
}

/// One entry of the banned/weak API bank.
struct ApiCheck {
    regex: Regex,
    title: &'static str,
    found_description: &'static str,
    status: Status,
    score: f32,
    cwe: Option<&'static str>,
    absent_description: &'static str,
}

impl ApiCheck {
    fn new(
        pattern: &str,
        title: &'static str,
        found_description: &'static str,
        status: Status,
        score: f32,
        cwe: Option<&'static str>,
        absent_description: &'static str,
    ) -> Self {
        Self {
            regex: Regex::new(pattern).expect("invalid API check regex"),
            title,
            found_description,
            status,
            score,
            cwe,
            absent_description,
        }
    }

    /// Evaluates the check against the dump, yielding exactly one finding.
    ///
    /// Matches are de-duplicated preserving first-seen order and joined
    /// into the description of the "found" variant.
    fn evaluate(&self, text: &str) -> Finding {
        let mut seen: Vec<&str> = Vec::new();
        for m in self.regex.find_iter(text) {
            if !seen.contains(&m.as_str()) {
                seen.push(m.as_str());
            }
        }

        if seen.is_empty() {
            Finding::new(self.title, self.absent_description, Status::Secure, 0.0, None)
        } else {
            Finding::new(
                self.title,
                format!("{}: {}", self.found_description, seen.join(", ")),
                self.status,
                self.score,
                self.cwe,
            )
        }
    }
}

lazy_static! {
    /// The banned/weak API bank, evaluated in order.
    static ref API_CHECKS: Vec<ApiCheck> = vec![
        ApiCheck::new(
            r"\b_(alloca|gets|memcpy|printf|scanf|sprintf|sscanf|strcat|strcpy|strncat|strncpy|strtok|swprintf|vsnprintf|vsprintf|vswprintf)\b",
            "Banned APIs",
            "The binary may contain banned APIs",
            Status::Insecure,
            6.0,
            Some("CWE-676"),
            "No banned APIs were found in the binary.",
        ),
        ApiCheck::new(
            r"\b_(random|srand|rand)\b",
            "Weak randomness",
            "The binary may use weak random number generators",
            Status::Insecure,
            5.3,
            Some("CWE-338"),
            "No weak random number generators were found in the binary.",
        ),
        ApiCheck::new(
            r"\b_CC_MD5\b",
            "MD5 hashing",
            "The binary may use the broken MD5 hash",
            Status::Insecure,
            5.9,
            Some("CWE-327"),
            "No MD5 hashing was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_CC_SHA1\b",
            "SHA-1 hashing",
            "The binary may use the weak SHA-1 hash",
            Status::Insecure,
            5.9,
            Some("CWE-327"),
            "No SHA-1 hashing was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_malloc\b",
            "Raw memory allocation",
            "The binary may use raw memory allocation",
            Status::Warning,
            4.0,
            Some("CWE-789"),
            "No raw memory allocation was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_system\b",
            "Command execution",
            "The binary may call system(3) to run shell commands",
            Status::Insecure,
            8.6,
            Some("CWE-78"),
            "No shell command execution was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_(mktemp|tmpnam|tempnam)\b",
            "Insecure temporary files",
            "The binary may create insecure temporary files",
            Status::Insecure,
            5.5,
            Some("CWE-377"),
            "No insecure temporary file creation was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_ptrace\b",
            "Anti-debugging",
            "The binary may use ptrace, often an anti-debugging measure",
            Status::Info,
            2.0,
            None,
            "No ptrace usage was found in the binary.",
        ),
        ApiCheck::new(
            r"\b_NSLog\b",
            "Logging statements",
            "The binary may log information via NSLog",
            Status::Info,
            3.0,
            Some("CWE-532"),
            "No NSLog statements were found in the binary.",
        ),
    ];
}

#[cfg(test)]
mod tests {
    use super::{class_findings, header_findings, symbol_findings};
    use crate::status::Status;

    /// Symbol dump resembling the lazy binding listing of a real binary.
    const SAMPLE_SYMBOLS: &str = "\
Demo:
Indirect symbols for (__TEXT,__stubs) 12 entries
address            index name
0x0000000100007e4c   115 ___stack_chk_guard
0x0000000100007e58   116 _objc_release
0x0000000100007e64   117 _strcpy
0x0000000100007e70   118 _memcpy
0x0000000100007e7c   119 _strcpy
0x0000000100007e88   120 _rand
0x0000000100007e94   121 _CC_MD5
0x0000000100007ea0   122 _malloc
0x0000000100007eac   123 _NSLog
0x0000000100007eb8   124 /usr/lib/swift/libswiftCore.dylib
";

    const SAMPLE_HEADERS: &str = "\
Mach header
      magic cputype cpusubtype  caps    filetype ncmds sizeofcmds      flags
MH_MAGIC_64   ARM64        ALL  0x00     EXECUTE    24       2728   NOUNDEFS DYLDLINK TWOLEVEL PIE
";

    #[test]
    fn it_emits_exactly_one_header_finding() {
        let findings = header_findings(SAMPLE_HEADERS);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status(), Status::Secure);

        let findings = header_findings("NOUNDEFS DYLDLINK TWOLEVEL");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status(), Status::Insecure);
    }

    #[test]
    fn it_emits_exactly_eleven_symbol_findings() {
        let findings = symbol_findings(SAMPLE_SYMBOLS);
        assert_eq!(findings.len(), 11);
    }

    #[test]
    fn it_keeps_the_symbol_finding_order_stable() {
        let first = symbol_findings(SAMPLE_SYMBOLS);
        let second = symbol_findings(SAMPLE_SYMBOLS);
        let titles: Vec<_> = first.iter().map(|f| f.title().to_owned()).collect();
        assert_eq!(
            titles,
            second
                .iter()
                .map(|f| f.title().to_owned())
                .collect::<Vec<_>>()
        );
        assert_eq!(titles[0], "Stack smashing protection");
        assert_eq!(titles[1], "Automatic reference counting");
        assert_eq!(titles[2], "Banned APIs");
        assert_eq!(titles[10], "Logging statements");
    }

    #[test]
    fn it_joins_deduplicated_matches_in_first_seen_order() {
        let findings = symbol_findings(SAMPLE_SYMBOLS);
        // _strcpy appears twice in the dump but only once in the finding.
        assert_eq!(
            findings[2].description(),
            "The binary may contain banned APIs: _strcpy, _memcpy"
        );
        assert_eq!(findings[2].status(), Status::Insecure);
        assert_eq!(findings[2].cwe(), Some("CWE-676"));
    }

    #[test]
    fn it_emits_canned_findings_when_nothing_matches() {
        let findings = symbol_findings("no interesting symbols here");
        assert_eq!(findings.len(), 11);
        assert!(findings.iter().skip(2).all(|f| f.status() == Status::Secure));
        // Markers are absence checks, so an empty dump means insecure.
        assert_eq!(findings[0].status(), Status::Insecure);
        assert_eq!(findings[1].status(), Status::Insecure);
    }

    #[test]
    fn it_emits_exactly_one_class_finding() {
        let found = class_findings("Contents of (__DATA,__objc_classlist): UIWebView");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status(), Status::Warning);

        let absent = class_findings("Contents of (__DATA,__objc_classlist): WKWebView");
        assert_eq!(absent.len(), 1);
        assert_eq!(absent[0].status(), Status::Secure);
    }

    #[test]
    fn it_emits_thirteen_findings_for_the_sample_binary() {
        let mut findings = header_findings(SAMPLE_HEADERS);
        findings.extend(symbol_findings(SAMPLE_SYMBOLS));
        findings.extend(class_findings("WKWebView only"));
        assert_eq!(findings.len(), 13);
    }
}
