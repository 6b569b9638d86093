use std::{io::IsTerminal, str::FromStr};

pub use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Mail leaving the tracker: forwards, replies, notifications.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Mail arriving at the tracker and the routing decisions made for it.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Level named by `LOG_LEVEL`, or `default` when it is unset or unknown.
fn parse_level(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
            eprintln!("tracker: unknown LOG_LEVEL {level:?}, logging at {default}");
            default
        })
    })
}

/// Only the workspace crates log; dependencies such as lettre stay quiet.
fn is_tracker_target(target: &str) -> bool {
    target == "tracker" || target.starts_with("tracker_") || target.starts_with("tracker::")
}

/// Install the global subscriber, logging to stderr.
///
/// Debug builds log everything by default, release builds from INFO.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    init_with_default(default);
}

/// Like [`init`], but with a caller chosen level when `LOG_LEVEL` is unset.
/// One-shot commands use this to keep their output quiet.
pub fn init_with_default(default: LevelFilter) {
    let level = parse_level(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(std::io::stderr().is_terminal())
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| is_tracker_target(metadata.target()))),
        )
        .init();
}
