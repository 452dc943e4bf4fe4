use std::error;
use std::fmt;
use std::io;
use std::result;
use std::str;

/// A type alias for `Result<T, csvflow::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when streaming CSV data.
///
/// Malformed quoting is deliberately *not* represented here: the parser is
/// lenient and absorbs unexpected bytes rather than failing the row or the
/// stream. The only hard failures are genuine I/O errors, UTF-8 failures at
/// the point a field is materialized as a string, and a quoted field left
/// unclosed at true end of stream.
#[derive(Debug)]
pub enum Error {
    /// An I/O error reported by the underlying byte source or sink.
    Io(io::Error),
    /// A field could not be decoded as UTF-8.
    ///
    /// This surfaces lazily, from the string-materialization call for the
    /// offending field; it never fails row parsing itself.
    Utf8 {
        /// The index of the field that failed validation.
        field: usize,
        /// The underlying UTF-8 error.
        err: str::Utf8Error,
    },
    /// The stream ended inside a quoted field.
    ///
    /// An unclosed quote can never be treated as a complete row, since doing
    /// so would silently truncate a value. The leftover bytes are discarded
    /// and the reader yields nothing further.
    UnterminatedQuote {
        /// The byte offset of the start of the truncated row.
        byte_offset: u64,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::Utf8 { ref err, .. } => Some(err),
            Error::UnterminatedQuote { .. } => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Utf8 { field, ref err } => {
                write!(f, "CSV field {} is not valid UTF-8: {}", field, err)
            }
            Error::UnterminatedQuote { byte_offset } => {
                write!(
                    f,
                    "CSV stream ended inside a quoted field \
                     (row starting at byte {})",
                    byte_offset
                )
            }
        }
    }
}
