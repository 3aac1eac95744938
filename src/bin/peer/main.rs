use std::process::ExitCode;

use log::{error, info, warn};

use peer::cli::{self, CliError};
use peer::config_file::{ConfigStore, SearchPath};
use peer::dispatch::{DispatchError, Dispatcher};
use peer::logger;
use peer::operations::Detached;
use peer::registry::{self, PeerContext};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Err(e) = logger::install() {
        eprintln!("Warning: logger already installed: {e}");
    }

    let commands = registry::peer_commands();
    let invocation = match cli::parse(commands, std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(CliError::Parse(e)) => {
            e.print()?;
            return Ok(ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1)));
        }
        Err(e) => return Err(e.into()),
    };

    let mut config = match ConfigStore::load(&SearchPath::from_env()) {
        Ok(config) => config.with_environment(std::env::vars()),
        Err(e) => {
            error!("Fatal error when reading {} config file: {e}", registry::ROOT_NAME);
            return Err(format!("cannot load configuration: {e}").into());
        }
    };
    registry::apply_flag_overrides(&mut config, &invocation.flags);

    let context = PeerContext::new(config, Detached);
    let dispatcher = Dispatcher::new(commands);
    let result = dispatcher.dispatch(&context, &invocation);
    match &result {
        Ok(()) => {}
        Err(DispatchError::NoAction { .. }) => {
            print!("{}", cli::render_help(commands, invocation.node));
        }
        Err(e) => {
            if e.is_fatal() {
                error!("{e}");
            } else {
                warn!("{e}");
            }
            eprintln!("Error: {e}");
        }
    }

    info!("Exiting.....");
    Ok(ExitCode::from(exit_status(&result)))
}

/// Process exit status for a dispatch outcome; every failure is non-zero.
fn exit_status(result: &Result<(), DispatchError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    }
}
