use thiserror::Error as ThisError;

/// Represents an error while decoding, encoding or building a Standard Midi File.
///
/// Every error carries an [`ErrorKind`], broadly categorizing what went wrong, and a
/// non-normative message pointing at the exact part of the format that was not respected.
///
/// All errors are fatal: a decode that produces an error never yields a partially built file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ThisError)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}
impl Error {
    /// Create a new error with the given kind and message.
    #[inline]
    pub const fn new(kind: ErrorKind, message: &'static str) -> Error {
        Error { kind, message }
    }

    /// The broad category of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the informative message on what exact part of the MIDI format was not respected.
    #[inline]
    pub fn message(&self) -> &'static str {
        self.message
    }
}

/// The type of error that occurred.
///
/// As a library consumer, detailed errors about what specific part of the MIDI standard was
/// violated are not very useful.
/// For this reason errors are categorized into a handful of classes, and the specific part of the
/// format is described by [`Error::message`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum ErrorKind {
    /// The file does not start with a valid `MThd` header chunk.
    #[error("malformed midi header")]
    MalformedHeader,
    /// The file is well-formed but uses a feature this crate does not handle, such as format 2
    /// files or SMPTE timecode division.
    #[error("unsupported midi feature")]
    Unsupported,
    /// A track chunk or one of its messages is corrupted.
    ///
    /// Some of these errors, like over-long varlen integers, are only raised if the `strict`
    /// crate feature is enabled.
    #[error("malformed midi track")]
    MalformedTrack,
    /// The input ended in the middle of a header, a chunk or a message.
    #[error("truncated midi stream")]
    Truncated,
    /// The caller attempted to build or encode a file that cannot be represented, such as a file
    /// with no tracks or a track longer than 4GB.
    #[error("invalid input")]
    InvalidInput,
}

macro_rules! err_header {
    ($msg:expr) => {
        $crate::error::Error::new($crate::error::ErrorKind::MalformedHeader, $msg)
    };
}
macro_rules! err_unsupported {
    ($msg:expr) => {
        $crate::error::Error::new($crate::error::ErrorKind::Unsupported, $msg)
    };
}
macro_rules! err_track {
    ($msg:expr) => {
        $crate::error::Error::new($crate::error::ErrorKind::MalformedTrack, $msg)
    };
}
macro_rules! err_truncated {
    ($msg:expr) => {
        $crate::error::Error::new($crate::error::ErrorKind::Truncated, $msg)
    };
}
macro_rules! err_input {
    ($msg:expr) => {
        $crate::error::Error::new($crate::error::ErrorKind::InvalidInput, $msg)
    };
}

/// The result type used throughout the crate.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
