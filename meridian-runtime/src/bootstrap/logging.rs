//! Structured logging over the log pipe handed down by the management
//! daemon. Every record is a single JSON object per line, written with one
//! `write(2)` so lines from the bootstrap stages never interleave.

use nix::errno::Errno;
use serde::Serialize;
use std::{
    env, fmt,
    process::exit,
    sync::atomic::{AtomicI32, Ordering},
};

/// Environment variable holding the log pipe fd number.
const ENV_LOG_PIPE: &str = "_LIBCONTAINER_LOGPIPE";

/// Destination fd for log lines. Negative means logging is disabled.
static LOG_FD: AtomicI32 = AtomicI32::new(-1);

#[derive(Serialize)]
struct Line<'a> {
    level: &'a str,
    msg: &'a str,
}

/// Attach the log pipe passed in the environment. This must happen before
/// anything that can bail, because bail reports through this pipe.
#[allow(clippy::print_stderr)]
pub(crate) fn attach() {
    let logpipe = match env::var(ENV_LOG_PIPE) {
        Ok(value) if !value.is_empty() => value,
        _ => return,
    };

    match logpipe.parse::<i32>() {
        Ok(fd) => LOG_FD.store(fd, Ordering::SeqCst),
        Err(_) => {
            // Too early to bail: the log pipe is what bail writes to.
            eprintln!("unable to parse {}, value: {}", ENV_LOG_PIPE, logpipe);
            exit(1);
        }
    }
}

/// Route the `log` facade onto the log pipe for the rest of the bootstrap.
/// The fd and the facade survive the stage clones unchanged.
pub(crate) fn install() {
    static LOGGER: PipeLogger = PipeLogger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

struct PipeLogger;

impl log::Log for PipeLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        LOG_FD.load(Ordering::SeqCst) >= 0
    }

    fn log(&self, record: &log::Record) {
        let level = match record.level() {
            log::Level::Error => "error",
            log::Level::Warn => "warning",
            log::Level::Info => "info",
            log::Level::Debug | log::Level::Trace => "debug",
        };
        emit(
            level,
            record.module_path().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args(),
        );
    }

    fn flush(&self) {}
}

fn render(level: &str, site: &str, line: u32, message: &fmt::Arguments) -> String {
    let msg = format!("{}:{} {}", site, line, message);
    let mut out = serde_json::to_string(&Line { level, msg: &msg }).unwrap_or_default();
    out.push('\n');
    out
}

fn emit(level: &str, site: &str, line: u32, message: &fmt::Arguments) {
    let fd = LOG_FD.load(Ordering::SeqCst);
    if fd < 0 {
        return;
    }
    let line = render(level, site, line, message);
    let _ = nix::unistd::write(fd, line.as_bytes());
}

/// Write a fatal line with the current errno description appended and exit
/// with status 1. Reserved for the `bail` macro.
pub(crate) fn fatal(site: &str, line: u32, message: fmt::Arguments) -> ! {
    let errno = Errno::last();
    emit(
        "fatal",
        site,
        line,
        &format_args!("bootstrap: {}: {}", message, errno.desc()),
    );
    exit(1);
}

/// Log a fatal error over the log pipe and exit the stage with status 1.
/// Mirrors the taxonomy of the stages: nothing is recovered, the only signal
/// to the management daemon is the exit code and the log line.
macro_rules! bail {
    ($($arg:tt)*) => {
        $crate::bootstrap::logging::fatal(module_path!(), line!(), format_args!($($arg)*))
    };
}

pub(crate) use bail;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn line_is_one_json_object() {
        let line = render("debug", "meridian_runtime::bootstrap", 42, &format_args!("hi"));
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["level"], "debug");
        assert_eq!(value["msg"], "meridian_runtime::bootstrap:42 hi");
    }

    #[test]
    fn message_escaping() {
        let line = render("info", "site", 1, &format_args!("quote \" and \\ backslash"));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["msg"], "site:1 quote \" and \\ backslash");
    }
}
