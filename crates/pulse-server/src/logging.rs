//! Tracing subscriber setup with a reloadable level filter.
//!
//! The filter sits behind a `reload` layer so the admin `debug/toggle` verb
//! can flip the live process between `info` and `debug` without a restart.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Live handle over the subscriber's level filter.
pub struct LogControl {
    handle: Option<FilterHandle>,
    debug: AtomicBool,
}

impl LogControl {
    /// A control that tracks the flag but drives no subscriber. Used by
    /// tests and by processes that installed their own subscriber.
    pub fn disabled() -> Self {
        Self {
            handle: None,
            debug: AtomicBool::new(false),
        }
    }

    /// Whether debug logging is currently on.
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    /// Switch the live filter between `debug` and `info`.
    pub fn set_debug(&self, on: bool) {
        if let Some(handle) = &self.handle {
            let level = if on { "debug" } else { "info" };
            let _ = handle.reload(EnvFilter::new(level));
        }
        self.debug.store(on, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("debug", &self.is_debug())
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber with stderr output.
///
/// Call once at startup; later calls return a disabled control. `RUST_LOG`
/// overrides `level` when set.
pub fn init(level: &str) -> LogControl {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .is_ok();

    LogControl {
        handle: installed.then_some(handle),
        debug: AtomicBool::new(level == "debug"),
    }
}
