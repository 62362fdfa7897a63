//! Optional subscriber setup for applications embedding pathmon.
//!
//! The monitor only emits `tracing` events under the `pathmon` target:
//! start, stop and source termination at `info`/`warn`, batch and
//! cancellation detail at `debug`, skipped nested paths at `trace`.
//! Install any subscriber you like, or call [`init_with_config`] with the
//! `[logging]` section of `pathmon.toml`:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "pathmon::monitor::path_monitor" = "debug"
//! notify = "info"
//! ```
//!
//! A set `RUST_LOG` replaces the configured directives entirely, e.g.
//! `RUST_LOG=pathmon=trace`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string for `config`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<(&String, &String)> = config.modules.iter().collect();
    modules.sort();

    let mut filter_str = config.default.clone();
    for (module, level) in modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Safe to call multiple times (only the first call takes effect). Does
/// nothing if another global subscriber is already installed.
///
/// The `RUST_LOG` environment variable takes precedence over config settings.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// Initialize logging with default configuration (`warn`).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level event tagged with the emitting component.
///
/// Renders as `[component] event: detail` and records `component` as a
/// structured field.
///
/// ```ignore
/// log_event!("monitor", "started", "{} ({} roots via {})", id, roots.len(), source.name());
/// log_event!("monitor", "stopped", "{}", id);
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!(component = $component, "[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!(
            component = $component,
            "[{}] {}: {}",
            $component,
            $event,
            format!($($arg)*)
        )
    };
}

/// Debug-level counterpart of [`log_event!`].
///
/// ```ignore
/// debug_event!("notify", "watching", "{}", root.display());
/// debug_event!("monitor", "cancelled", "{dropped} pending deliveries");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!(component = $component, "[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = $component,
            "[{}] {}: {}",
            $component,
            $event,
            format!($($arg)*)
        )
    };
}
