use std::borrow::Cow;
use std::fmt;
use std::ops;
use std::str;

use bstr::BStr;
use csvflow_core::{unescape, FieldSpan};

use crate::error::{Error, Result};

/// One parsed CSV row.
///
/// A row owns an independent copy of its bytes, so it stays valid after the
/// reader that produced it advances or is dropped. Field values are
/// materialized lazily: [`get`](Row::get) borrows straight out of the row
/// unless the field contains escape sequences, and
/// [`get_str`](Row::get_str) defers UTF-8 validation until a string is
/// actually requested.
#[derive(Clone, Eq, PartialEq)]
pub struct Row {
    data: Vec<u8>,
    spans: Vec<FieldSpan>,
    quote: u8,
    escape: u8,
}

impl Row {
    pub(crate) fn new(
        data: Vec<u8>,
        spans: Vec<FieldSpan>,
        quote: u8,
        escape: u8,
    ) -> Row {
        Row { data, spans, quote, escape }
    }

    /// The number of fields in this row.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if this row has no fields.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The raw bytes backing this row, including any quoting, escape
    /// sequences and the row terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The boundaries of each field within [`as_bytes`](Row::as_bytes).
    pub fn spans(&self) -> &[FieldSpan] {
        &self.spans
    }

    /// Return the unescaped bytes of the field at index `i`, or `None` if
    /// no such field exists.
    ///
    /// Borrows from the row unless the field was quoted and actually
    /// contains an escape sequence.
    pub fn get(&self, i: usize) -> Option<Cow<[u8]>> {
        let span = self.spans.get(i)?;
        let raw = span.of(&self.data);
        if span.quoted {
            Some(unescape(raw, self.quote, self.escape))
        } else {
            Some(Cow::Borrowed(raw))
        }
    }

    /// Return the field at index `i` as a string, or `None` if no such
    /// field exists.
    ///
    /// Decoding happens here, not at parse time: a field that is not valid
    /// UTF-8 fails this call with [`Error::Utf8`] without affecting the
    /// rest of the row.
    pub fn get_str(&self, i: usize) -> Option<Result<Cow<str>>> {
        let field = self.get(i)?;
        Some(match field {
            Cow::Borrowed(bytes) => match str::from_utf8(bytes) {
                Ok(s) => Ok(Cow::Borrowed(s)),
                Err(err) => Err(Error::Utf8 { field: i, err }),
            },
            Cow::Owned(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Ok(Cow::Owned(s)),
                Err(err) => Err(Error::Utf8 {
                    field: i,
                    err: err.utf8_error(),
                }),
            },
        })
    }

    /// An iterator over the unescaped bytes of each field.
    pub fn iter(&self) -> Fields {
        Fields { row: self, i: 0 }
    }

    /// Materialize every field as an owned `String`.
    ///
    /// Convenience for tests and small inputs; fails on the first field
    /// that is not valid UTF-8.
    pub fn to_strings(&self) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            match self.get_str(i) {
                Some(Ok(s)) => out.push(s.into_owned()),
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        Ok(out)
    }
}

/// Indexes a field's raw content bytes, before any unescaping.
///
/// # Panics
///
/// Panics if the index is out of bounds; use [`get`](Row::get) for a
/// non-panicking (and unescaping) variant.
impl ops::Index<usize> for Row {
    type Output = [u8];

    fn index(&self, i: usize) -> &[u8] {
        self.spans[i].of(&self.data)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<Cow<[u8]>> = self.iter().collect();
        f.debug_list()
            .entries(fields.iter().map(|f| BStr::new(f.as_ref())))
            .finish()
    }
}

impl<'a> IntoIterator for &'a Row {
    type IntoIter = Fields<'a>;
    type Item = Cow<'a, [u8]>;

    fn into_iter(self) -> Fields<'a> {
        self.iter()
    }
}

/// An iterator over the fields of a [`Row`].
pub struct Fields<'a> {
    row: &'a Row,
    i: usize,
}

impl<'a> Iterator for Fields<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Cow<'a, [u8]>> {
        let field = self.row.get(self.i)?;
        self.i += 1;
        Some(field)
    }
}
