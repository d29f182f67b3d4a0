//! Tagged error taxonomy for the tape core.
//!
//! Every fallible operation in this crate returns `TapeError` so callers can
//! branch on `kind()` instead of parsing message text. Transient I/O is
//! retried locally and never escapes as an error; `EndOfMedium` is converted
//! into a spanning transition by the write pipeline and likewise never
//! surfaces past it.

use std::fmt;

use proxmox_uuid::Uuid;

/// Stable tag attached to every `TapeError`, used for programmatic handling.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    IoTransient,
    IoFatal,
    EndOfMedium,
    EndOfData,
    DeviceBusy,
    NotMounted,
    BadLabel,
    WrongPool,
    BadKey,
    ChecksumMismatch,
    CatalogConflict,
    Cancelled,
    Timeout,
    InvariantViolation,
    TapeUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::IoTransient => "io-transient",
            ErrorKind::IoFatal => "io-fatal",
            ErrorKind::EndOfMedium => "end-of-medium",
            ErrorKind::EndOfData => "end-of-data",
            ErrorKind::DeviceBusy => "device-busy",
            ErrorKind::NotMounted => "not-mounted",
            ErrorKind::BadLabel => "bad-label",
            ErrorKind::WrongPool => "wrong-pool",
            ErrorKind::BadKey => "bad-key",
            ErrorKind::ChecksumMismatch => "checksum-mismatch",
            ErrorKind::CatalogConflict => "catalog-conflict",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvariantViolation => "invariant-violation",
            ErrorKind::TapeUnavailable => "tape-unavailable",
        };
        f.write_str(s)
    }
}

/// A tape core error: a stable `kind` plus a free-form detail string for logs.
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {detail}")]
pub struct TapeError {
    kind: ErrorKind,
    detail: String,
}

impl TapeError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::IoTransient
    }

    pub fn end_of_medium() -> Self {
        Self::new(ErrorKind::EndOfMedium, "tape has no remaining capacity")
    }

    pub fn end_of_data() -> Self {
        Self::new(ErrorKind::EndOfData, "read past last record")
    }

    pub fn device_busy() -> Self {
        Self::new(ErrorKind::DeviceBusy, "device already in use by another run")
    }

    pub fn not_mounted() -> Self {
        Self::new(ErrorKind::NotMounted, "no medium present in the drive")
    }

    pub fn bad_label(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadLabel, detail)
    }

    pub fn wrong_pool(expected: &str, found: &str) -> Self {
        Self::new(
            ErrorKind::WrongPool,
            format!("expected pool '{expected}', found '{found}'"),
        )
    }

    pub fn bad_key(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadKey, detail)
    }

    pub fn checksum_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChecksumMismatch, detail)
    }

    pub fn catalog_conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::CatalogConflict, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run was cancelled")
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    /// A required tape could not be mounted (operator timeout, changer
    /// fault, tape not present). Carries the uuid(s) the caller needed so a
    /// retry can be targeted rather than just "timed out again".
    pub fn tape_unavailable(uuids: Vec<Uuid>, reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::TapeUnavailable, format!("{}: {reason}", TapeUnavailable(uuids)))
    }

    /// Fatal for the process: nonce reuse, label UUID mismatch, etc. Must be
    /// logged with full context and block further writes until an operator
    /// intervenes.
    pub fn invariant_violation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, detail)
    }

    pub fn io_transient(err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::IoTransient, err.to_string())
    }

    pub fn io_fatal(err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::IoFatal, err.to_string())
    }
}

impl From<std::io::Error> for TapeError {
    /// A `TapeError` that was boxed into an `io::Error` by a `Read`/`Write`
    /// adapter (see `ChunkDecryptReader`) unwraps back to its original
    /// `kind()` here instead of being reclassified from the `io::ErrorKind`
    /// alone — otherwise a `BadKey` surfaced through the chunk codec's `Read`
    /// impl would come back out as a generic `IoFatal`.
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let io_kind = err.kind();
        let message = err.to_string();
        if let Some(boxed) = err.into_inner() {
            return match boxed.downcast::<TapeError>() {
                Ok(tape_err) => *tape_err,
                Err(other) => match io_kind {
                    IoKind::Interrupted | IoKind::WouldBlock | IoKind::TimedOut => {
                        TapeError::new(ErrorKind::IoTransient, other.to_string())
                    }
                    _ => TapeError::new(ErrorKind::IoFatal, other.to_string()),
                },
            };
        }
        match io_kind {
            IoKind::Interrupted | IoKind::WouldBlock | IoKind::TimedOut => {
                TapeError::new(ErrorKind::IoTransient, message)
            }
            _ => TapeError::new(ErrorKind::IoFatal, message),
        }
    }
}

impl From<serde_json::Error> for TapeError {
    fn from(err: serde_json::Error) -> Self {
        TapeError::io_fatal(err)
    }
}

impl From<openssl::error::ErrorStack> for TapeError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        TapeError::new(ErrorKind::BadKey, err.to_string())
    }
}

/// Error returned when a requested restore cannot proceed because a tape
/// isn't available (not mounted, not yet imported, etc).
#[derive(thiserror::Error, Debug)]
#[error("required tapes not available: {0:?}")]
pub struct TapeUnavailable(pub Vec<Uuid>);

pub type TapeResult<T> = Result<T, TapeError>;
