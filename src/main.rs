mod app;
mod backup;
mod cli;
mod config;
mod error;
mod extract;
mod installer;
mod mapping;
mod naming;
mod saves;
mod scan;
mod sims4;
mod toggle;

use anyhow::Result;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;

fn main() -> Result<()> {
    cli::run()
}

/// Terminal output at `level`, plus an Info-level log file beside the config.
pub(crate) fn init_logging(level: LevelFilter) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_file = config::base_dir().ok().and_then(|base| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(config::log_path(&base))
            .ok()
    });
    match log_file {
        Some(file) => loggers.push(WriteLogger::new(
            level.max(LevelFilter::Info),
            Config::default(),
            file,
        )),
        None => eprintln!("Could not open the log file; logging to the terminal only."),
    }

    let _ = CombinedLogger::init(loggers);
}
