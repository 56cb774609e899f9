use std::fs::File;
use std::io::Write;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;

/// Writes records to stderr and, when configured, to a log file.
///
/// The two sinks filter independently: stderr stays quiet unless `RUST_LOG`
/// asks for more, while the file records debug output by default.
struct CmdlinkLogger {
    file: Option<Mutex<File>>,
    stderr_filter: LevelFilter,
    file_filter: LevelFilter,
    start: Instant,
}

impl Log for CmdlinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.stderr_filter
            || (self.file.is_some() && metadata.level() <= self.file_filter)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() <= self.stderr_filter {
            eprintln!("[{}] {}", record.level(), record.args());
        }

        if let Some(ref file) = self.file
            && record.level() <= self.file_filter
        {
            let elapsed = self.start.elapsed().as_secs_f64();
            let _ = writeln!(
                file.lock(),
                "[{elapsed:.3}s] [{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Parses a `RUST_LOG` style value holding a single level.
fn parse_filter(value: Option<&str>) -> Option<LevelFilter> {
    value.and_then(|s| s.trim().parse().ok())
}

/// Initialize the global logger. Must be called once before any logging.
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger was already installed.
pub fn init(log_file: Option<File>) -> Result<(), SetLoggerError> {
    let env_filter = parse_filter(std::env::var("RUST_LOG").ok().as_deref());
    let stderr_filter = env_filter.unwrap_or(LevelFilter::Warn);
    let file_filter = env_filter.unwrap_or(LevelFilter::Debug);

    let max = if log_file.is_some() {
        stderr_filter.max(file_filter)
    } else {
        stderr_filter
    };

    let logger = CmdlinkLogger {
        file: log_file.map(Mutex::new),
        stderr_filter,
        file_filter,
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max);
    Ok(())
}
