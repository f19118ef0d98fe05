use std::{fs::OpenOptions, path::Path, str::FromStr, sync::Mutex};

use tracing::metadata::LevelFilter;
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

/// Remote calls: token exchanges and mail submissions
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Messages entering the queue
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

fn level() -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber, appending to `log_file`.
///
/// Falls back to stderr when the file cannot be opened, so a broken log
/// directory never stops mail from being queued or delivered.
pub fn init(log_file: &Path) {
    let level = level();

    let layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    if let Some(parent) = log_file.parent()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Unable to create log directory {}: {err}", parent.display());
    }

    let layer = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => layer
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed(),
        Err(err) => {
            eprintln!(
                "Unable to open log file {}: {err}, logging to stderr",
                log_file.display()
            );
            layer.with_ansi(true).with_writer(std::io::stderr).boxed()
        }
    };

    let _ = tracing_subscriber::Registry::default()
        .with(
            layer.with_filter(level).with_filter(FilterFn::new(|metadata| {
                metadata.target().starts_with("mailrelay")
            })),
        )
        .try_init();
}
