//! Stderr logging for the landing binary.
//!
//! Records from the `landing_vision*` crates pass at the configured level;
//! everything else (serial port, image decoding) is held at `Warn` or the
//! configured level, whichever is quieter. Lines look like
//! `[   12.345s  INFO runner] tag 37: ...`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, fmt::format::FmtSpan, util::SubscriberInitExt, EnvFilter};

const OWN_PREFIX: &str = "landing_vision";

struct FlightLogger {
    own: LevelFilter,
    deps: LevelFilter,
    boot: Instant,
}

impl FlightLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_PREFIX) {
            self.own
        } else {
            self.deps
        }
    }
}

/// `landing_vision_link::transport` → `link::transport`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix("landing_vision_")
        .or_else(|| target.strip_prefix("landing_vision::"))
        .unwrap_or(target)
}

impl Log for FlightLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => " WARN",
            Level::Info => " INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "[{:9.3}s {level} {}] {}",
            self.boot.elapsed().as_secs_f64(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<FlightLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first configuration.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| FlightLogger {
        own: level,
        deps: level.min(LevelFilter::Warn),
        boot: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// `-v` count to level: none → info, one → debug, more → trace.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`),
/// logging span close events so per-frame timings are visible.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,serialport=warn"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder.with_timer(fmt::time::Uptime::default()).finish().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_steps_through_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Info);
        assert_eq!(level_from_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(7), LevelFilter::Trace);
    }

    #[test]
    fn dependencies_are_held_at_warn() {
        let logger = FlightLogger {
            own: LevelFilter::Debug,
            deps: LevelFilter::Debug.min(LevelFilter::Warn),
            boot: Instant::now(),
        };
        assert_eq!(logger.limit_for("landing_vision::runner"), LevelFilter::Debug);
        assert_eq!(logger.limit_for("serialport::posix"), LevelFilter::Warn);
    }

    #[test]
    fn repeat_init_is_ok_and_errors_box_cleanly() {
        assert!(init_with_level(LevelFilter::Info).is_ok());
        assert!(init_with_level(LevelFilter::Trace).is_ok());

        // The CLI propagates this with `?` into `Box<dyn Error>`.
        fn boxed(e: log::SetLoggerError) -> Box<dyn std::error::Error> {
            e.into()
        }
        let _ = boxed;
    }

    #[test]
    fn targets_are_shortened() {
        assert_eq!(short_target("landing_vision_link::transport"), "link::transport");
        assert_eq!(short_target("landing_vision::runner"), "runner");
        assert_eq!(short_target("serialport"), "serialport");
    }
}
