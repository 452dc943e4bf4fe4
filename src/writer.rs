use std::fs::File;
use std::io;
use std::path::Path;

use memchr::memchr;

use crate::error::Result;

/// Default number of buffered bytes before the writer flushes on its own.
const DEFAULT_FLUSH_THRESHOLD: usize = 8 * 1024;

/// Builds a CSV writer with various configuration knobs.
#[derive(Debug)]
pub struct WriterBuilder {
    delimiter: u8,
    quote: u8,
    flush_threshold: usize,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder {
            delimiter: b',',
            quote: b'"',
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl WriterBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> WriterBuilder {
        WriterBuilder::default()
    }

    /// The field delimiter to use when writing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut WriterBuilder {
        self.delimiter = delimiter;
        self
    }

    /// The quote byte to use when writing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut WriterBuilder {
        self.quote = quote;
        self
    }

    /// The buffered byte count past which rows are flushed to the sink
    /// without waiting for an explicit `flush`.
    ///
    /// The default is 8 KiB.
    pub fn flush_threshold(&mut self, bytes: usize) -> &mut WriterBuilder {
        self.flush_threshold = bytes;
        self
    }

    /// Build a writer that formats rows into `wtr`.
    pub fn from_writer<W: io::Write>(&self, wtr: W) -> Writer<W> {
        Writer {
            sink: wtr,
            buf: Vec::with_capacity(self.flush_threshold),
            field_buf: vec![],
            delimiter: self.delimiter,
            quote: self.quote,
            flush_threshold: self.flush_threshold,
        }
    }

    /// Build a writer for the file at the given path, creating it if
    /// necessary and truncating it otherwise.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Writer<File>> {
        Ok(self.from_writer(File::create(path)?))
    }
}

/// Formats one value as the bytes of a single CSV field.
///
/// This is the scalar serialization convention for the writer direction:
/// strings and byte slices pass through untouched, integers and floats use
/// their shortest decimal representation. Quoting is not this trait's
/// concern; the writer decides that per field.
pub trait ToField {
    /// Append this value's field bytes to `out`.
    fn write_field(&self, out: &mut Vec<u8>);
}

impl ToField for str {
    fn write_field(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl ToField for String {
    fn write_field(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl ToField for [u8] {
    fn write_field(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl ToField for Vec<u8> {
    fn write_field(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl ToField for bool {
    fn write_field(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(if *self { b"true" } else { b"false" });
    }
}

macro_rules! to_field_int {
    ($($ty:ty),*) => {
        $(
            impl ToField for $ty {
                fn write_field(&self, out: &mut Vec<u8>) {
                    let mut buf = itoa::Buffer::new();
                    out.extend_from_slice(buf.format(*self).as_bytes());
                }
            }
        )*
    }
}

to_field_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! to_field_float {
    ($($ty:ty),*) => {
        $(
            impl ToField for $ty {
                fn write_field(&self, out: &mut Vec<u8>) {
                    let mut buf = ryu::Buffer::new();
                    out.extend_from_slice(buf.format(*self).as_bytes());
                }
            }
        )*
    }
}

to_field_float!(f32, f64);

impl<'a, T: ToField + ?Sized> ToField for &'a T {
    fn write_field(&self, out: &mut Vec<u8>) {
        (*self).write_field(out);
    }
}

impl<T: ToField + ?Sized> ToField for Box<T> {
    fn write_field(&self, out: &mut Vec<u8>) {
        (**self).write_field(out);
    }
}

/// A buffered CSV writer.
///
/// A field is quoted if and only if it contains the delimiter, the quote
/// byte, or either line-terminator byte; embedded quotes are doubled. Rows
/// are terminated with a single LF. Output accumulates in an internal
/// buffer that drains to the sink when it crosses the flush threshold, on
/// an explicit [`flush`](Writer::flush), or when the writer is dropped
/// (best effort; call `flush` to observe errors).
///
/// # Example
///
/// ```
/// use csvflow::WriterBuilder;
///
/// let mut out = vec![];
/// {
///     let mut wtr = WriterBuilder::new().from_writer(&mut out);
///     wtr.write_row(&["a", "b,c"]).unwrap();
///     wtr.write_row(&["1", "2"]).unwrap();
///     wtr.flush().unwrap();
/// }
/// assert_eq!(out, b"a,\"b,c\"\n1,2\n");
/// ```
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    sink: W,
    buf: Vec<u8>,
    /// Scratch for one encoded field, reused across rows.
    field_buf: Vec<u8>,
    delimiter: u8,
    quote: u8,
    flush_threshold: usize,
}

impl<W: io::Write> Writer<W> {
    /// Create a writer with the default configuration.
    pub fn from_writer(wtr: W) -> Writer<W> {
        WriterBuilder::new().from_writer(wtr)
    }

    /// Format one row and buffer it, flushing to the sink if the buffer
    /// has crossed the threshold.
    pub fn write_row<I>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: ToField,
    {
        let mut first = true;
        for field in row {
            if !first {
                self.buf.push(self.delimiter);
            }
            first = false;
            self.field_buf.clear();
            field.write_field(&mut self.field_buf);
            if needs_quotes(&self.field_buf, self.delimiter, self.quote) {
                push_quoted(&mut self.buf, &self.field_buf, self.quote);
            } else {
                self.buf.extend_from_slice(&self.field_buf);
            }
        }
        self.buf.push(b'\n');
        if self.buf.len() >= self.flush_threshold {
            self.flush_buf()?;
        }
        Ok(())
    }

    /// Drain the internal buffer and flush the sink itself.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_buf()?;
        self.sink.flush()?;
        Ok(())
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.sink.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: io::Write> Drop for Writer<W> {
    fn drop(&mut self) {
        let _ = self.flush_buf();
        let _ = self.sink.flush();
    }
}

fn needs_quotes(field: &[u8], delimiter: u8, quote: u8) -> bool {
    field.iter().any(|&b| {
        b == delimiter || b == quote || b == b'\r' || b == b'\n'
    })
}

fn push_quoted(out: &mut Vec<u8>, mut field: &[u8], quote: u8) {
    out.push(quote);
    while let Some(i) = memchr(quote, field) {
        out.extend_from_slice(&field[..i]);
        out.push(quote);
        out.push(quote);
        field = &field[i + 1..];
    }
    out.extend_from_slice(field);
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::{Writer, WriterBuilder};

    fn written<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut Writer<&mut Vec<u8>>),
    {
        let mut out = vec![];
        {
            let mut wtr = Writer::from_writer(&mut out);
            f(&mut wtr);
            wtr.flush().unwrap();
        }
        out
    }

    #[test]
    fn plain_row() {
        let out = written(|w| w.write_row(&["a", "b", "c"]).unwrap());
        assert_eq!(out, b"a,b,c\n");
    }

    #[test]
    fn quotes_only_when_needed() {
        let out = written(|w| {
            w.write_row(&["plain", "with,comma", "with\nnewline"]).unwrap()
        });
        assert_eq!(out, b"plain,\"with,comma\",\"with\nnewline\"\n");
    }

    #[test]
    fn cr_triggers_quoting() {
        let out = written(|w| w.write_row(&["a\rb"]).unwrap());
        assert_eq!(out, b"\"a\rb\"\n");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let out =
            written(|w| w.write_row(&["She said \"Hello\""]).unwrap());
        assert_eq!(out, b"\"She said \"\"Hello\"\"\"\n");
    }

    #[test]
    fn empty_fields() {
        let out = written(|w| w.write_row(&["", "", ""]).unwrap());
        assert_eq!(out, b",,\n");
    }

    #[test]
    fn scalar_fields() {
        let mut out = vec![];
        {
            let mut wtr = Writer::from_writer(&mut out);
            wtr.write_row(vec![
                Box::new(42u32) as Box<dyn super::ToField>,
                Box::new(-7i64),
                Box::new(2.5f64),
                Box::new(true),
            ])
            .unwrap();
            wtr.flush().unwrap();
        }
        assert_eq!(out, b"42,-7,2.5,true\n");
    }

    #[test]
    fn custom_delimiter() {
        let mut out = vec![];
        {
            let mut wtr =
                WriterBuilder::new().delimiter(b'\t').from_writer(&mut out);
            wtr.write_row(&["a", "b,c"]).unwrap();
            wtr.flush().unwrap();
        }
        // The comma no longer needs quoting, the tab would.
        assert_eq!(out, b"a\tb,c\n");
    }

    #[test]
    fn drop_flushes_buffered_rows() {
        let mut out = vec![];
        {
            let mut wtr = Writer::from_writer(&mut out);
            wtr.write_row(&["x"]).unwrap();
        }
        assert_eq!(out, b"x\n");
    }

    #[test]
    fn threshold_flushes_midstream() {
        let mut out = vec![];
        {
            let mut wtr = WriterBuilder::new()
                .flush_threshold(4)
                .from_writer(&mut out);
            wtr.write_row(&["abcdef"]).unwrap();
            // Already past the threshold, so the sink has the row even
            // before an explicit flush.
            assert_eq!(*wtr.sink, b"abcdef\n");
        }
    }
}
