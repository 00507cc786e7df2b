use std::path::PathBuf;
use clap::Parser;
use log::{error, info, LevelFilter};
use dglab_link::{init_logging, run};
use dglab_link::error::{AppRunError, ConfigError};

/// Connects to a DG-LAB e-stim box over Bluetooth LE and controls its output.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Also write the log to this file
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    init_logging(level, args.log_file)?;
    info!(concat!("DG-LAB Link ", env!("CARGO_PKG_VERSION")));

    match run() {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(())
    }
}
