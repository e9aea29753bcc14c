//! `log` backend setup for the CLI.

use env_logger::{Builder, WriteStyle};
use log::LevelFilter;

use crate::config::Config;

/// Level after applying `-v` flags on top of the configured level.
///
/// `-v` raises to at least `info`, `-vv` to at least `debug`, more to `trace`.
pub fn level_for(config: &Config, verbosity: u8) -> LevelFilter {
    let requested = match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    config.level_filter().max(requested)
}

/// Build the logger without installing it.
pub fn builder(config: &Config, verbosity: u8) -> Builder {
    let mut builder = Builder::new();
    builder
        .filter_level(level_for(config, verbosity))
        .write_style(if config.color {
            WriteStyle::Auto
        } else {
            WriteStyle::Never
        })
        .format_timestamp(None)
        .format_target(false);
    builder
}

/// Install the global logger. Later calls are ignored.
pub fn init(config: &Config, verbosity: u8) {
    let _ = builder(config, verbosity).try_init();
}
