use std::fs::File;
use std::io;
use std::path::Path;

use csvflow_core::{ParsedRow, RowParser, RowParserBuilder};

use crate::buffer::StreamBuffer;
use crate::error::{Error, Result};
use crate::record::Row;
use crate::sizer::ChunkSizer;

/// Default initial capacity for the stream buffer: 64 KiB.
const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Compact the stream buffer once this many consumed bytes pile up at the
/// front of the store.
const RECLAIM_THRESHOLD: usize = 64 * 1024;

/// Builds a streaming CSV reader with various configuration knobs.
#[derive(Debug)]
pub struct ReaderBuilder {
    parser: RowParserBuilder,
    buffer_capacity: usize,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            parser: RowParserBuilder::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// The field delimiter to use when parsing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut ReaderBuilder {
        self.parser.delimiter(delimiter);
        self
    }

    /// The quote byte to use when parsing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut ReaderBuilder {
        self.parser.quote(quote);
        self
    }

    /// The escape byte recognized inside quoted fields.
    ///
    /// The default is `b'"'` (doubled-quote escaping).
    pub fn escape(&mut self, escape: u8) -> &mut ReaderBuilder {
        self.parser.escape(escape);
        self
    }

    /// The initial capacity of the stream buffer in bytes, and the floor
    /// below which it never shrinks.
    ///
    /// The default is 64 KiB. This also seeds the adaptive sizer's starting
    /// rung.
    pub fn buffer_capacity(&mut self, bytes: usize) -> &mut ReaderBuilder {
        self.buffer_capacity = bytes;
        self
    }

    /// Build a reader that pulls bytes from `rdr`.
    pub fn from_reader<R: io::Read>(&self, rdr: R) -> Reader<R> {
        Reader {
            src: rdr,
            parser: self.parser.build(),
            buf: StreamBuffer::with_capacity(self.buffer_capacity),
            sizer: ChunkSizer::starting_at(self.buffer_capacity),
            scratch: vec![],
            pos: 0,
            exhausted: false,
            done: false,
            pending_lone_cr: false,
        }
    }

    /// Build a reader for the file at the given path.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Reader<File>> {
        Ok(self.from_reader(File::open(path)?))
    }
}

/// A streaming CSV reader over any `io::Read`.
///
/// Rows are pulled lazily: nothing is requested from the underlying source
/// until the consumer asks for the next row, and each fetch is sized by an
/// adaptive estimate of recent row sizes. The reader buffers only as much
/// of the input as is needed to decide that one row is complete, so inputs
/// of arbitrary size parse in bounded memory (bounded by the largest single
/// row, not the input).
///
/// # Example
///
/// ```
/// use csvflow::ReaderBuilder;
///
/// let data = "city,pop\n\"Springfield, IL\",114000\n";
/// let mut rdr = ReaderBuilder::new().from_reader(data.as_bytes());
/// let mut cities = vec![];
/// for row in rdr.rows() {
///     let row = row.unwrap();
///     cities.push(row.get_str(0).unwrap().unwrap().into_owned());
/// }
/// assert_eq!(cities, vec!["city", "Springfield, IL"]);
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    src: R,
    parser: RowParser,
    buf: StreamBuffer,
    sizer: ChunkSizer,
    /// Staging area for a single fetch from the source.
    scratch: Vec<u8>,
    /// Byte offset of consumed input.
    pos: u64,
    /// The source has reported end of stream.
    exhausted: bool,
    /// No further rows or errors will be produced.
    done: bool,
    /// The previous row was terminated by a CR whose paired LF, if any, had
    /// not yet arrived. Checked once against the next buffered byte.
    pending_lone_cr: bool,
}

impl<R: io::Read> Reader<R> {
    /// Create a reader with the default configuration.
    pub fn from_reader(rdr: R) -> Reader<R> {
        ReaderBuilder::new().from_reader(rdr)
    }

    /// Read the next row, or `Ok(None)` at end of stream.
    pub fn read_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if self.pending_lone_cr {
                if let Some(&b) = self.buf.readable().first() {
                    // A CRLF terminator split across two fetches: the CR
                    // already ended the previous row, so its paired LF is
                    // not a row of its own.
                    if b == b'\n' {
                        self.buf.skip(1);
                        self.pos += 1;
                    }
                    self.pending_lone_cr = false;
                } else if self.exhausted {
                    self.pending_lone_cr = false;
                }
                // Otherwise the buffer is empty but more data may come;
                // leave the flag set until there is a byte to inspect.
            }
            let parsed =
                self.parser.parse_row(self.buf.readable(), self.exhausted);
            if let Some(parsed) = parsed {
                return Ok(Some(self.take_row(parsed)));
            }
            if self.exhausted {
                self.done = true;
                if !self.buf.is_empty() {
                    // Only an unclosed quote leaves undecidable bytes at
                    // true end of stream.
                    let leftover = self.buf.len();
                    self.buf.skip(leftover);
                    return Err(Error::UnterminatedQuote {
                        byte_offset: self.pos,
                    });
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// An iterator over all remaining rows.
    pub fn rows(&mut self) -> Rows<R> {
        Rows { rdr: self }
    }

    /// The byte offset of input consumed so far.
    ///
    /// Skipped terminator bytes count; buffered-but-unparsed bytes do not.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns true once the reader can produce no further rows.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Copy one recognized row out of the buffer and advance past it.
    fn take_row(&mut self, parsed: ParsedRow) -> Row {
        let consumed = parsed.consumed;
        let data = self.buf.readable()[..consumed].to_vec();
        self.buf.skip(consumed);
        if self.buf.is_empty() || self.buf.consumed() > RECLAIM_THRESHOLD {
            self.buf.compact();
        }
        self.pos += consumed as u64;
        self.sizer.record_row(consumed);
        // parse_row consumes a paired LF when it is present in the slice,
        // so a trailing CR here means the LF (if any) has not arrived yet.
        self.pending_lone_cr =
            data[consumed - 1] == b'\r' && self.buf.is_empty();
        Row::new(
            data,
            parsed.spans,
            self.parser.quote(),
            self.parser.escape(),
        )
    }

    /// Fetch one chunk from the source into the buffer, or mark the source
    /// exhausted.
    fn fill(&mut self) -> Result<()> {
        let mut want = self.sizer.recommended();
        if self.buf.len() >= want {
            // The row in flight is already bigger than a whole fetch;
            // escalate rather than crawling toward it.
            want = self.sizer.handle_oversized(self.buf.len());
        }
        if self.scratch.len() < want {
            self.scratch.resize(want, 0);
        }
        loop {
            match self.src.read(&mut self.scratch[..want]) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.write(&self.scratch[..n]);
                    return Ok(());
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::Interrupted =>
                {
                    continue;
                }
                Err(err) => return Err(Error::Io(err)),
            }
        }
    }
}

/// An iterator over the rows of a [`Reader`].
pub struct Rows<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
}

impl<'r, R: io::Read> Iterator for Rows<'r, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        match self.rdr.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
