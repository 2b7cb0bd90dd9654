//! Logging setup
//!
//! The library logs through the `log` facade. `init` installs a tracing
//! subscriber that prints both `tracing` events and `log` records.

use tracing::Level;

use crate::config::CollectionsConfig;

/// Install the global subscriber at the configured level.
///
/// Returns `false` when a subscriber was already installed.
pub fn init(config: &CollectionsConfig) -> bool {
    let level = parse_level(&config.log_level);
    match tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
    {
        Ok(()) => {
            log::debug!("Logging initialised at {}", level);
            true
        }
        Err(_) => false,
    }
}

/// Unknown level names fall back to INFO
fn parse_level(name: &str) -> Level {
    name.trim().parse::<Level>().unwrap_or(Level::INFO)
}
