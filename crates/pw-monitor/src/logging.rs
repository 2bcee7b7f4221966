//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "PEGWATCH_LOG";

const DEFAULT_FILTER: &str = "pegwatch=info,pw_monitor=info,pw_risk=info,pw_data=info";

static INIT: Once = Once::new();

/// Install the global fmt subscriber.
///
/// Filter directives come from `PEGWATCH_LOG`, e.g.
/// `PEGWATCH_LOG=pw_monitor=debug,pw_risk=warn`. An unset or unparsable value
/// falls back to `info` for the PegWatch crates. Calling this more than once
/// is harmless, as is calling it after another subscriber was installed.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .try_init();
    });
}
