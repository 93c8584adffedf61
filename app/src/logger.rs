use std::io::Write;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second].[subsecond digits:3]");

lazy_static! {
    static ref LOGGER: Logger = Logger::new(Box::new(std::io::stderr()));
}

/// Writes timestamped log lines to given output
pub struct Logger {
    output: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(output: Box<dyn Write + Send>) -> Self {
        Logger {
            output: Mutex::new(output),
        }
    }

    pub fn global() -> &'static Logger {
        &LOGGER
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Install global logger that writes to stderr
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(Logger::global())?;
    log::set_max_level(level);
    Ok(())
}

fn format_line(timestamp: OffsetDateTime, record: &Record<'_>) -> String {
    let timestamp = timestamp
        .format(TIMESTAMP)
        .unwrap_or_else(|_| "--:--:--.---".to_string());
    format!(
        "{} {:<5} [{}] {}",
        timestamp,
        record.level(),
        record.module_path().unwrap_or("-"),
        record.args()
    )
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(OffsetDateTime::now_utc(), record);
        if let Ok(mut output) = self.output.lock() {
            // nowhere to report failed write
            let _ = writeln!(output, "{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }
}
