//! SIRA Analyzer CLI.

use colored::Colorize;
use sira_analyzer_core::{
    analyze_application, artifact_name, cli, generate_report, initialize_config,
    initialize_logger, print_error, Services,
};
use std::process::exit;

fn main() {
    let cli = cli::generate_cli().get_matches();
    initialize_logger(cli.is_present("verbose"));

    let config = match initialize_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            print_error(format!("{:#}", e));
            exit(1);
        }
    };

    if !config.check() {
        for error in config.errors() {
            print_error(error);
        }
        exit(10);
    }

    if config.is_verbose() {
        println!("{}", "SIRA iOS Analyzer".bold());
        println!(
            "Analyzing {} with the following analyses enabled: {}.",
            config.app_path().display(),
            config
                .analyses()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let services = Services::production(&config);

    match analyze_application(&config, &services) {
        Ok((report, failures)) => {
            let name = artifact_name(&config);
            if let Err(e) = generate_report(&config, &report, &name) {
                print_error(format!("{:#}", e));
                exit(20);
            }
            if !failures.is_empty() {
                exit(30);
            }
        }
        Err(e) => {
            print_error(format!("{:#}", e));
            exit(2);
        }
    }
}
