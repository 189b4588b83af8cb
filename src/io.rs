//! Provides the `Write` sink trait used by the encoder, along with implementations for in-memory
//! buffers and `std::io::Write` streams.
//!
//! The encoder only ever needs to append bytes, so the trait is intentionally tiny.
//! Implementations choose their own error type, which lets in-memory encoding report limit
//! violations as a crate [`Error`](../struct.Error.html) while streaming encoders report
//! `std::io::Error`s.

use crate::prelude::*;

/// The result of a write operation on the writer `W`.
pub type WriteResult<W> = StdResult<(), <W as Write>::Error>;

/// An append-only byte sink.
pub trait Write {
    /// The error type produced by this writer.
    type Error;

    /// Append all of the given bytes to the sink.
    fn write(&mut self, buf: &[u8]) -> WriteResult<Self>;

    /// Build the error raised when the data to encode breaks the limits of the SMF format, such
    /// as a chunk larger than 4GB.
    fn invalid_input(msg: &'static str) -> Self::Error;
}

impl Write for Vec<u8> {
    type Error = Error;
    #[inline]
    fn write(&mut self, buf: &[u8]) -> WriteResult<Self> {
        self.extend_from_slice(buf);
        Ok(())
    }
    #[inline]
    fn invalid_input(msg: &'static str) -> Error {
        err_input!(msg)
    }
}

/// Wraps a `std::io::Write` stream so that it can be used as a `smfkit::io::Write` sink.
pub struct IoWrap<T>(pub T);
impl<T: io::Write> Write for IoWrap<T> {
    type Error = io::Error;
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.0, buf)
    }
    #[inline]
    fn invalid_input(msg: &'static str) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidInput, msg)
    }
}
