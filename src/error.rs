//! Error types for the gateway.

use thiserror::Error;

/// The main error type for gateway operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mapping rules could not be loaded.
    #[error("rule error on line {line}: {source}")]
    Config {
        /// 1-based line number of the offending line.
        line: usize,
        /// What was wrong with it.
        #[source]
        source: RuleError,
    },

    /// Invalid bridge definition.
    #[error("invalid bridge: {reason}")]
    InvalidBridge { reason: String },

    /// The telegram byte source reached end of stream.
    #[error("byte source closed")]
    SourceClosed,
}

/// Problems with a single mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Line does not match any directive.
    #[error("expected line in form XX:XX:XX:XX <button> <value>, got {0:?}")]
    Syntax(String),

    /// Sensor ID is not four two-digit hexadecimal octets.
    #[error("invalid sensor ID {0:?}, expected ##:##:##:## where # is a hex digit")]
    InvalidSensorId(String),

    /// Button code outside of the accepted range.
    #[error("button ID must be in range [-3,8], got {0}")]
    ButtonOutOfRange(i32),

    /// A zero command value.
    #[error("value must be specified")]
    MissingValue,

    /// Expanded button value does not fit into 32 bits.
    #[error("value {value} + button {button} overflows")]
    ValueOverflow { value: i32, button: i32 },

    /// Bridge selector outside of [1,8].
    #[error("bridge number must be in range [1,8], got {0}")]
    BridgeOutOfRange(i64),

    /// Bridge selector listed twice.
    #[error("bridge {0} listed more than once")]
    DuplicateBridge(u8),

    /// Group selector is not a small non-negative integer.
    #[error("invalid group {0:?}")]
    InvalidGroup(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
