//! Log output that coexists with the per-fill progress bars.
//!
//! Lines look like `[INFO ] watcher: 1850: stock 3/3`, where the component is
//! the last segment of the record's module path.

use indicatif::MultiProgress;

/// Dependencies that are chatty at debug level
const QUIET_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "native_tls", "h2"];

fn label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// `archiscribe_cache::watcher` -> `watcher`
fn component(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn render(record: &log::Record, color: bool) -> String {
    let level = record.level();
    let tag = if color {
        format!("{}{}\x1b[0m", ansi(level), label(level))
    } else {
        label(level).to_string()
    };
    format!("[{tag}] {}: {}", component(record.target()), record.args())
}

/// Logger that prints through indicatif `MultiProgress` so log lines do not
/// tear the per-fill progress bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.matches(record) {
            let line = render(record, true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn builder(default_level: &str) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    for module in QUIET_MODULES {
        builder.filter_module(module, log::LevelFilter::Warn);
    }
    builder
}

/// Install the global logger.
///
/// On a TTY (`multi` given) lines are colored and routed around the bars;
/// otherwise they are plain and timestamped for log collectors. `RUST_LOG`
/// still wins over the level picked from `quiet`/`debug`.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };

    match multi {
        Some(multi) => {
            let logger = builder(default_level).build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))
                .expect("failed to init logger");
            log::set_max_level(max_level);
        }
        None => builder(default_level)
            .format(|buf, record| {
                writeln!(buf, "{} {}", buf.timestamp_seconds(), render(record, false))
            })
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_line(target: &str, level: log::Level, color: bool) -> String {
        render(
            &log::Record::builder()
                .target(target)
                .level(level)
                .args(format_args!("1850: stock 3/3"))
                .build(),
            color,
        )
    }

    #[test]
    fn plain_line_names_component() {
        assert_eq!(
            record_line("archiscribe_cache::watcher", log::Level::Info, false),
            "[INFO ] watcher: 1850: stock 3/3"
        );
    }

    #[test]
    fn colored_line_resets() {
        let line = record_line("archiscribe_cli", log::Level::Error, true);
        assert!(line.starts_with("[\x1b[31mERROR\x1b[0m] archiscribe_cli: "));
    }
}
