use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub fn styled_progress_bar(total: usize, message: &str) -> ProgressBar {
    let progress_bar = ProgressBar::new(total as u64);
    let format_string = format!(
        "[+]\t{}: {{bar:40.cyan/blue}} {{pos:>7}}/{{len:12}}",
        message
    );
    match ProgressStyle::with_template(format_string.as_str()) {
        Ok(style) => progress_bar.set_style(style),
        Err(error) => log::debug!("Problem with the progress bar: {:?}", error),
    };
    progress_bar
}

/// A spinner for scans where the total is not known up front. Hidden when
/// stderr is not a terminal.
pub fn styled_spinner(message: &str) -> ProgressBar {
    let progress_bar = ProgressBar::new_spinner();
    let format_string = format!("[+]\t{}: {{spinner:.cyan}} {{pos}} records", message);
    match ProgressStyle::with_template(format_string.as_str()) {
        Ok(style) => progress_bar.set_style(style),
        Err(error) => log::debug!("Problem with the spinner: {:?}", error),
    };
    progress_bar.enable_steady_tick(Duration::from_millis(120));
    progress_bar
}

/// Log level from the `-v` and `-q` flags.
pub fn log_level(verbose: bool, quiet: bool) -> LevelFilter {
    match (verbose, quiet) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Warn,
        (false, false) => LevelFilter::Info,
    }
}

/// Install `env_logger`. `RUST_LOG` overrides the level from the flags.
pub fn init_logger(verbose: bool, quiet: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(log_level(verbose, quiet))
        .parse_default_env()
        .format_target(false)
        .try_init();
}
