//! Testbench configuration, read from the environment.
//!
//! | variable             | meaning                                        | default       |
//! |----------------------|------------------------------------------------|---------------|
//! | `RSTB_TESTCASE`      | comma separated list of tests to run           | all tests     |
//! | `RSTB_RESULTS`       | JUnit XML output path, empty disables          | `results.xml` |
//! | `RSTB_VCD`           | VCD dump of the signal trace                   | none          |
//! | `RSTB_PRECISION`     | simulator time precision exponent (`-15..=0`)  | `-12`         |
//! | `RSTB_TIME_LIMIT_NS` | stop the simulation after this many ns         | none          |
//! | `RSTB_LOG_LEVEL`     | `debug`, `info`, `warning` or `error`          | `info`        |

use std::path::PathBuf;

use crate::error::RstbError;
use crate::logger::LogLevel;
use crate::SimpleResult;

#[derive(Debug, Clone, PartialEq)]
pub struct TbConfig {
    pub testcase: Option<Vec<String>>,
    pub results: Option<PathBuf>,
    pub vcd: Option<PathBuf>,
    pub precision: i8,
    pub time_limit_ns: Option<u64>,
    pub log_level: LogLevel,
}

impl Default for TbConfig {
    fn default() -> Self {
        Self {
            testcase: None,
            results: Some(PathBuf::from("results.xml")),
            vcd: None,
            precision: -12,
            time_limit_ns: None,
            log_level: LogLevel::Info,
        }
    }
}

impl TbConfig {
    pub fn from_env() -> SimpleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SimpleResult<Self> {
        let mut config = Self::default();
        if let Some(list) = lookup("RSTB_TESTCASE") {
            let names: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !names.is_empty() {
                config.testcase = Some(names);
            }
        }
        if let Some(path) = lookup("RSTB_RESULTS") {
            config.results = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(path) = lookup("RSTB_VCD") {
            config.vcd = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(p) = lookup("RSTB_PRECISION") {
            let precision: i8 = p.trim().parse().map_err(|_| RstbError::Config {
                key: "RSTB_PRECISION".to_string(),
                reason: format!("not an integer: '{}'", p),
            })?;
            if !(-15..=0).contains(&precision) {
                return Err(RstbError::InvalidPrecision(precision));
            }
            config.precision = precision;
        }
        if let Some(t) = lookup("RSTB_TIME_LIMIT_NS") {
            config.time_limit_ns = Some(t.trim().parse().map_err(|_| RstbError::Config {
                key: "RSTB_TIME_LIMIT_NS".to_string(),
                reason: format!("not an integer: '{}'", t),
            })?);
        }
        if let Some(level) = lookup("RSTB_LOG_LEVEL") {
            config.log_level = level.parse()?;
        }
        Ok(config)
    }

    pub fn with_results(mut self, path: Option<PathBuf>) -> Self {
        self.results = path;
        self
    }

    pub fn with_vcd(mut self, path: Option<PathBuf>) -> Self {
        self.vcd = path;
        self
    }

    pub fn with_testcase(mut self, names: &[&str]) -> Self {
        self.testcase = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_time_limit_ns(mut self, limit: Option<u64>) -> Self {
        self.time_limit_ns = limit;
        self
    }

    /// Whether the test `name` is selected to run.
    pub fn selects(&self, name: &str) -> bool {
        match &self.testcase {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}
