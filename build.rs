#[macro_use]
extern crate clap;

use clap::Shell;
use std::path::PathBuf;

#[path = "src/cli.rs"]
mod cli;

fn main() {
    let mut cli = cli::generate_cli();
    let mut out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    out_dir.pop();
    out_dir.pop();
    out_dir.pop();

    cli.gen_completions("sira", Shell::Bash, &out_dir);
    cli.gen_completions("sira", Shell::Fish, out_dir);
    // ZSH completion script generation is blocked by:
    // https://github.com/kbknapp/clap-rs/issues/754
    // cli.gen_completions("sira", Shell::Zsh, out_dir);
}
