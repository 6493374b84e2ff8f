//! Component K: Console Logging.
//!
//! Maps the CLI's repeated `-v` flag to a `tracing_subscriber` level filter
//! and installs it as the global subscriber. The core's own modules only
//! ever call `tracing` macros; this module is the only place that decides
//! what gets printed and how.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// `-v` count to level, clamped at 3 (`0` = errors only, `3+` = everything).
pub fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global console subscriber. `RUST_LOG` still overrides the
/// `-v`-derived default.
pub fn init(verbosity: u8) {
    let default_filter = level_filter(verbosity);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_is_clamped_at_trace() {
        assert_eq!(level_filter(0), LevelFilter::ERROR);
        assert_eq!(level_filter(3), LevelFilter::TRACE);
        assert_eq!(level_filter(200), LevelFilter::TRACE);
    }
}
