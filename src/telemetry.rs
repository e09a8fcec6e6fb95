//! Telemetry initialization.
//!
//! Controlled by two environment variables:
//! - `LEXMERGE_LOG` — an `EnvFilter` directive (default `warn`)
//! - `LEXMERGE_LOG_FORMAT` — `json` for JSON lines, anything else for the
//!   compact human format
//!
//! Everything goes to stderr so merged documents on stdout stay clean.
//! Only the binary calls [`init`]; the library never installs a subscriber.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "LEXMERGE_LOG";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "LEXMERGE_LOG_FORMAT";

/// Install the global tracing subscriber.
///
/// Reads `LEXMERGE_LOG` for the filter (default `warn`) and
/// `LEXMERGE_LOG_FORMAT` for the format. Call once, from `main`.
pub fn init() {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
