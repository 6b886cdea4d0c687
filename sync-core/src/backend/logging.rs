//! Process-wide logger setup.
//!
//! Library code only ever talks to the `log` facade. Host applications call
//! [`init_logging`] once at startup to route those records through
//! `env_logger`. `RUST_LOG` overrides the default level.

use log::info;
use once_cell::sync::OnceCell;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install `env_logger` with `default_level` unless `RUST_LOG` says otherwise.
///
/// Safe to call repeatedly. Returns false when another logger was already
/// installed by someone else, in which case ours is silently skipped.
pub fn init_logging(default_level: &str) -> bool {
    *LOGGER_INSTALLED.get_or_init(|| {
        let installed = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(default_level),
        )
        .format_timestamp_millis()
        .try_init()
        .is_ok();

        if installed {
            info!("Logging initialized (default level {})", default_level);
        }
        installed
    })
}
