use std::path::PathBuf;
use log::LevelFilter;

use crate::error::AppRunError;
use crate::gui::application::run_application;

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod gui;
pub mod protocol;

pub fn init_logging(level: LevelFilter, log_file: Option<PathBuf>) -> Result<(), AppRunError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        // our own crate logs at the requested level, dependencies (btleplug, iced) only warn
        .level_for("dglab_link", level)
        .chain(std::io::stderr());

    if let Some(log_file) = log_file {
        let file = fern::log_file(log_file).map_err(|source| AppRunError::LogFile { source })?;
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

pub fn run() -> Result<(), AppRunError> {
    run_application()?;
    Ok(())
}
