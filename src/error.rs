/*!
 * Error Types
 *
 * Snapshot decoding failures and per-request command errors. Network and
 * startup code uses `anyhow` on top of these.
 */

use thiserror::Error;

/// Failure while decoding a snapshot file
///
/// Any of these aborts the load; entries inserted before the failure stay
/// in the store.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file ended before the fixed-size header was complete
    #[error("snapshot header is shorter than {0} bytes")]
    Header(usize),

    /// The stream ended in the middle of a record
    #[error("snapshot truncated while reading {0}")]
    Truncated(&'static str),

    /// A 32-bit length field decoded to a negative number
    #[error("invalid length field: {0}")]
    InvalidLength(i32),
}

/// Error reported to a client as `-ERR <message>\r\n`
///
/// The `Display` output is exactly the text following `-ERR `.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command")]
    Unknown,

    /// Wrong number of arguments for a known command
    #[error("invalid {0} syntax")]
    Syntax(&'static str),

    #[error("unsupported INFO section")]
    UnsupportedSection,

    #[error("Protocol error: invalid multibulk length")]
    MultibulkLength,

    /// Unprocessed input grew past the per-connection limit
    #[error("Protocol error: request too large")]
    RequestTooLarge,
}
