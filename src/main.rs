// Headless entry point. All argument handling lives in the library's `cli`
// module so the same pipeline is reachable from scripts and tests.

use std::process::ExitCode;

use clap::Parser;

use gr8paint::cli::{self, CliArgs};

fn main() -> ExitCode {
    // RUST_LOG controls verbosity; errors are always reported on stderr.
    env_logger::init();
    cli::run(CliArgs::parse())
}
