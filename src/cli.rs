//! Command line interface definition.
//!
//! This module is included both from the library and from `build.rs`, where
//! it is used to generate shell completion scripts. It must therefore stay
//! free of dependencies on the rest of the crate.

use clap::{App, Arg};

/// Generates the complete CLI application.
pub fn generate_cli<'a, 'b>() -> App<'a, 'b> {
    App::new("SIRA")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Audits iOS application bundles and source trees for vulnerabilities.")
        .arg(
            Arg::with_name("path")
                .help(
                    "Path to the application artifact: an .ipa or .zip archive, an exploded \
                     .app bundle, or a directory containing one",
                )
                .value_name("PATH")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("source")
                .long("source")
                .help("Treat PATH as a source tree instead of a compiled bundle"),
        )
        .arg(
            Arg::with_name("source_path")
                .short("s")
                .long("source-path")
                .value_name("DIR")
                .takes_value(true)
                .help("Additional source tree to analyze along with the compiled bundle"),
        )
        .arg(
            Arg::with_name("analyses")
                .short("a")
                .long("analyses")
                .value_name("LIST")
                .takes_value(true)
                .help(
                    "Comma separated list of the analyses to run: manifest, files, code, binary, \
                     reputation, store [default: all of them]",
                ),
        )
        .arg(
            Arg::with_name("country")
                .short("c")
                .long("country")
                .value_name("CODE")
                .takes_value(true)
                .help("Two letter store country code used for the store lookup [default: us]"),
        )
        .arg(
            Arg::with_name("api_key")
                .long("api-key")
                .value_name("KEY")
                .takes_value(true)
                .help("API key for the file reputation service"),
        )
        .arg(
            Arg::with_name("rules")
                .long("rules")
                .value_name("FILE")
                .takes_value(true)
                .help("Path to a custom rules.json file"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .value_name("THREADS")
                .takes_value(true)
                .help("Number of threads used for the code analysis"),
        )
        .arg(
            Arg::with_name("min_status")
                .long("min-status")
                .value_name("STATUS")
                .takes_value(true)
                .help("Minimum status for code rules to be checked: info, warning or insecure"),
        )
        .arg(
            Arg::with_name("results")
                .long("results")
                .value_name("DIR")
                .takes_value(true)
                .help("Folder where the results report will be written"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .conflicts_with("quiet")
                .help("Shows detailed information about the analysis"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .conflicts_with("verbose")
                .help("Only shows vulnerabilities and errors"),
        )
        .arg(
            Arg::with_name("force")
                .long("force")
                .help("Overwrites previous results for the same application"),
        )
        .arg(
            Arg::with_name("bench")
                .long("bench")
                .help("Shows benchmarks for each analysis phase"),
        )
}
