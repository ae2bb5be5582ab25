//! Binary entry point for `rendezvousd`.

use std::io;
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use rendezvous_config::Config;
use rendezvousd::{LaunchError, report_outcome, run_server};

fn main() -> ExitCode {
    let result = Config::load()
        .map_err(LaunchError::from)
        .and_then(|config| run_server(&config));
    let code = report_outcome(&result, &mut io::stdout(), &mut io::stderr());
    ExitCode::from(code)
}
