//! Error type shared by the simulator interface, the executor and tests.

/// Errors raised while driving a simulation.
///
/// Test bodies return [`crate::RstbResult`]; any `Err` marks the running test
/// as failed and is reported by the harness.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RstbError {
    /// No simulator has been initialized on this thread.
    #[error("no simulator running")]
    NoSimulator,

    /// A hierarchical name did not resolve to a simulator object.
    #[error("object not found: {name}")]
    ObjectNotFound { name: String },

    /// A handle does not refer to a known simulator object.
    #[error("invalid object handle: {0}")]
    InvalidHandle(usize),

    /// The object has no value that can be read or written.
    #[error("object {name} is not modifiable")]
    NotModifiable { name: String },

    /// The value does not fit the width of the target signal.
    #[error("value {value} does not fit {name} ({width} bits)")]
    ValueOutOfRange { name: String, value: i64, width: u32 },

    /// The signal currently holds an unresolved (x/z) value.
    #[error("object {name} has an unresolved value")]
    UnresolvedValue { name: String },

    /// Writes are not allowed in the read-only synchronization phase.
    #[error("write to {name} during read-only phase")]
    ReadOnlyWrite { name: String },

    /// Unknown time unit string.
    #[error("invalid time unit: {0}")]
    InvalidTimeUnit(String),

    /// The requested time is not representable in simulator steps.
    #[error("can't convert {time} {unit} to sim steps without rounding (sim precision: {precision})")]
    TimePrecision {
        time: f64,
        unit: String,
        precision: String,
    },

    /// The configured time precision is outside `-15..=0`.
    #[error("invalid time precision: 1e{0} s")]
    InvalidPrecision(i8),

    /// Unknown or already cancelled callback handle.
    #[error("invalid callback handle: {0}")]
    InvalidCallback(usize),

    /// Too many evaluation passes at a single time step.
    #[error("delta cycle limit exceeded at {time_fs} fs (max {max_deltas} deltas)")]
    DeltaCycleLimit { time_fs: u64, max_deltas: u32 },

    /// The awaited task was cancelled before completing.
    #[error("task cancelled")]
    Cancelled,

    /// A test failed with the given message.
    #[error("test failed: {0}")]
    TestFailed(String),

    /// Invalid configuration value.
    #[error("invalid configuration {key}: {reason}")]
    Config { key: String, reason: String },

    /// Writing a report (JUnit XML, VCD) failed.
    #[error("report error: {0}")]
    Report(String),
}

impl From<std::io::Error> for RstbError {
    fn from(e: std::io::Error) -> Self {
        RstbError::Report(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_not_found_display() {
        let e = RstbError::ObjectNotFound {
            name: "user_proj_example.RSTB".into(),
        };
        assert_eq!(e.to_string(), "object not found: user_proj_example.RSTB");
    }

    #[test]
    fn time_precision_display() {
        let e = RstbError::TimePrecision {
            time: 1.5,
            unit: "ps".into(),
            precision: "ps".into(),
        };
        assert_eq!(
            e.to_string(),
            "can't convert 1.5 ps to sim steps without rounding (sim precision: ps)"
        );
    }

    #[test]
    fn io_error_becomes_report_error() {
        let e: RstbError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, RstbError::Report(ref m) if m.contains("gone")));
    }
}
