//! Stderr logging for the scan tools.
//!
//! Records from `tilescan*` targets pass at the installed level; everything
//! else (image codecs, FFT planners) is held to `warn` so a `--verbose` run
//! stays readable. Lines look like `[  1.234s  INFO fov] message`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

const OWN_PREFIX: &str = "tilescan";

struct ScanLogger {
    level: LevelFilter,
    started: Instant,
}

impl ScanLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_PREFIX) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        }
    }
}

/// `tilescan_mosaic::assembler` prints as `mosaic::assembler`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix("tilescan_")
        .or_else(|| target.strip_prefix(OWN_PREFIX).map(|t| t.trim_start_matches("::")))
        .filter(|t| !t.is_empty())
        .unwrap_or(target)
}

impl Log for ScanLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f64();
        let mut err = std::io::stderr().lock();
        let _ = match record.level() {
            Level::Error | Level::Warn => writeln!(
                err,
                "[{secs:7.3}s {:>5} {}] {}",
                record.level(),
                short_target(record.target()),
                record.args()
            ),
            level => writeln!(err, "[{secs:7.3}s {level:>5}] {}", record.args()),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ScanLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| ScanLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber on stderr, filtered by `RUST_LOG`
/// (default `tilescan=info` plus `warn` elsewhere). Span close events carry
/// their timings, which is how per-tile and per-sweep costs show up.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tilescan=info,tilescan_core=info,tilescan_plan=info,tilescan_focus=info,tilescan_fov=info,tilescan_mosaic=info"));
    let base = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        base.json().flatten_event(true).finish().try_init()
    } else {
        base.with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
