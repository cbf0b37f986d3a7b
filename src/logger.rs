//! Scoped logging through the simulator's log sink.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use crate::error::RstbError;
use crate::sim_if::SIM_IF;

thread_local! {
    static LOG_LEVEL: Cell<LogLevel> = const { Cell::new(LogLevel::Info) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.pad(s)
    }
}

impl FromStr for LogLevel {
    type Err = RstbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(RstbError::Config {
                key: "RSTB_LOG_LEVEL".to_string(),
                reason: format!("unknown level '{}'", s),
            }),
        }
    }
}

/// Sets the minimum level emitted by [`SimLogger`]s on this thread.
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.with(|l| l.set(level));
}

pub fn log_level() -> LogLevel {
    LOG_LEVEL.with(|l| l.get())
}

/// Logger bound to a design scope, obtained with [`crate::SimObject::log`].
#[derive(Debug, Clone)]
pub struct SimLogger {
    scope: String,
}

impl SimLogger {
    pub fn new(scope: String) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn log(&self, level: LogLevel, msg: &str) {
        if level >= log_level() {
            SIM_IF.log(&format!("{:<8} {:<24} {}", level, self.scope, msg));
        }
    }

    pub fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg)
    }

    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg)
    }

    pub fn warning(&self, msg: &str) {
        self.log(LogLevel::Warning, msg)
    }

    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{self, Design};

    #[test]
    fn parse_levels() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn info_line_carries_level_and_scope() {
        kernel::init(&Design::new("top"), -12).unwrap();
        SimLogger::new("top".into()).info("hello");
        let log = kernel::log_records().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].message.starts_with("INFO"));
        assert!(log[0].message.contains("top"));
        assert!(log[0].message.ends_with("hello"));
    }
}
