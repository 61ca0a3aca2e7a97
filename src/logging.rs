//! Process-wide log output
//!
//! The library only emits `tracing` events; the binary installs the
//! subscriber. `SCMTILES_LOG` selects the maximum level
//! (`trace`, `debug`, `info`, `warn` or `error`, default `info`).

use tracing::Level;

/// Environment variable selecting the log level
pub const LOG_LEVEL_VAR: &str = "SCMTILES_LOG";

/// Install the stderr formatter (no-op if a subscriber is already set)
pub fn init() {
    let level = std::env::var(LOG_LEVEL_VAR)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or(Level::INFO);

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_level(value: &str) -> Option<Level> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" WARN "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
