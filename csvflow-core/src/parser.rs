use std::borrow::Cow;

use memchr::{memchr, memchr2, memchr3};

/// The location of one field within the byte slice it was parsed from.
///
/// Offsets are relative to the exact slice passed to the
/// [`RowParser::parse_row`] call that produced this span; they are
/// meaningless against any other slice. For a quoted field the range
/// excludes the enclosing quotes, but the content may still contain escape
/// sequences. Use [`unescape`] to materialize the literal value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldSpan {
    /// Byte offset of the first content byte of the field.
    pub start: usize,
    /// Byte offset one past the last content byte of the field.
    pub end: usize,
    /// Whether the field was enclosed in quotes.
    pub quoted: bool,
}

impl FieldSpan {
    /// Slice `data` down to this field's content bytes.
    ///
    /// # Panics
    ///
    /// Panics if the span does not fit in `data`, which can only happen when
    /// the span is applied to a slice other than the one it was parsed from.
    pub fn of<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }

    /// The number of content bytes in the field (before unescaping).
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the field has no content bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One successfully recognized row.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedRow {
    /// The fields of the row, in order.
    pub spans: Vec<FieldSpan>,
    /// Total number of input bytes consumed, including the row terminator
    /// when one was present.
    pub consumed: usize,
}

/// Builds a row parser with various configuration knobs.
#[derive(Debug, Default)]
pub struct RowParserBuilder {
    parser: RowParser,
}

impl RowParserBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> RowParserBuilder {
        RowParserBuilder::default()
    }

    /// The field delimiter.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut RowParserBuilder {
        self.parser.delimiter = delimiter;
        self
    }

    /// The quote byte.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut RowParserBuilder {
        self.parser.quote = quote;
        self
    }

    /// The escape byte recognized inside quoted fields.
    ///
    /// The default is `b'"'`, i.e. quotes are escaped by doubling them.
    /// When set to a distinct byte (say `b'\\'`), that byte followed by the
    /// quote byte unescapes to a literal quote.
    pub fn escape(&mut self, escape: u8) -> &mut RowParserBuilder {
        self.parser.escape = escape;
        self
    }

    /// Build the parser from this configuration.
    pub fn build(&self) -> RowParser {
        self.parser.clone()
    }
}

/// An incremental CSV row recognizer.
///
/// `parse_row` is a pure function of its inputs: the parser keeps no state
/// between calls, so the caller is free to retry the same slice after more
/// bytes have been buffered. All streaming state lives in where the caller's
/// read cursor sits.
#[derive(Clone, Debug)]
pub struct RowParser {
    delimiter: u8,
    quote: u8,
    escape: u8,
}

impl Default for RowParser {
    fn default() -> RowParser {
        RowParser { delimiter: b',', quote: b'"', escape: b'"' }
    }
}

impl RowParser {
    /// Create a parser with the default configuration.
    pub fn new() -> RowParser {
        RowParser::default()
    }

    /// The configured field delimiter.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// The configured quote byte.
    pub fn quote(&self) -> u8 {
        self.quote
    }

    /// The configured escape byte.
    pub fn escape(&self) -> u8 {
        self.escape
    }

    /// Attempt to recognize exactly one row starting at offset 0 of `input`.
    ///
    /// Returns `None` when the slice does not contain enough information to
    /// know that a complete row is present. `is_final` must be true only
    /// when the caller guarantees that no bytes will ever follow `input`;
    /// in that case a trailing unterminated row is finalized using
    /// everything seen so far as its last field.
    ///
    /// Rules, in rough order of subtlety:
    ///
    /// * A quote byte is only special as the very first byte of a field.
    ///   Anywhere else in an unquoted field it is ordinary content.
    /// * CR and LF inside a quoted field are content, which is what makes
    ///   multi-line fields work.
    /// * An unquoted CR or LF ends the row. A CR immediately followed by an
    ///   LF *within this slice* consumes both bytes as one terminator; a CR
    ///   at the end of the slice consumes only itself, and the caller is
    ///   responsible for swallowing a paired LF that arrives later.
    /// * After a closing quote, a delimiter or terminator ends the field,
    ///   another quote byte re-enters the quoted field (a doubled quote),
    ///   and any other byte is absorbed without error. The field's recorded
    ///   range still ends at the closing quote.
    /// * A slice ending while inside quotes is always incomplete, even when
    ///   `is_final` is true: treating an unclosed quote as a row would
    ///   silently truncate a value. The caller decides what to do with the
    ///   leftover bytes.
    /// * An empty slice is always incomplete. This is what lets a caller
    ///   distinguish end-of-stream from a row boundary landing exactly on a
    ///   chunk edge.
    pub fn parse_row(
        &self,
        input: &[u8],
        is_final: bool,
    ) -> Option<ParsedRow> {
        if input.is_empty() {
            return None;
        }
        let mut spans = Vec::new();
        let mut pos = 0;
        let mut field_start = 0;
        // End of quoted content, valid only while after_quote is set or the
        // field is being finalized as quoted.
        let mut quote_end = 0;
        let mut in_quotes = false;
        let mut after_quote = false;

        while pos < input.len() {
            let b = input[pos];
            if in_quotes {
                if b == self.escape
                    && input.get(pos + 1) == Some(&self.quote)
                {
                    pos += 2;
                    continue;
                }
                if b == self.quote {
                    in_quotes = false;
                    after_quote = true;
                    quote_end = pos;
                    pos += 1;
                    continue;
                }
                // Ordinary quoted content; skip ahead to the next byte that
                // can change quote state.
                pos += 1;
                match memchr2(self.quote, self.escape, &input[pos..]) {
                    Some(i) => pos += i,
                    None => pos = input.len(),
                }
                continue;
            }
            if after_quote {
                if b == self.quote {
                    // Doubled quote straddling the closing quote.
                    in_quotes = true;
                    after_quote = false;
                    pos += 1;
                    continue;
                }
                if b == self.delimiter {
                    spans.push(FieldSpan {
                        start: field_start,
                        end: quote_end,
                        quoted: true,
                    });
                    pos += 1;
                    field_start = pos;
                    after_quote = false;
                    continue;
                }
                if b == b'\r' || b == b'\n' {
                    spans.push(FieldSpan {
                        start: field_start,
                        end: quote_end,
                        quoted: true,
                    });
                    let consumed = self.consume_terminator(input, pos);
                    return Some(ParsedRow { spans, consumed });
                }
                // Lenient: junk after a closing quote is absorbed. The field
                // still ends at the quote.
                pos += 1;
                continue;
            }
            if b == self.quote && pos == field_start {
                in_quotes = true;
                field_start = pos + 1;
                pos += 1;
                continue;
            }
            if b == self.delimiter {
                spans.push(FieldSpan {
                    start: field_start,
                    end: pos,
                    quoted: false,
                });
                pos += 1;
                field_start = pos;
                continue;
            }
            if b == b'\r' || b == b'\n' {
                spans.push(FieldSpan {
                    start: field_start,
                    end: pos,
                    quoted: false,
                });
                let consumed = self.consume_terminator(input, pos);
                return Some(ParsedRow { spans, consumed });
            }
            // Ordinary unquoted content; skip ahead to the next byte that
            // can end the field or the row.
            pos += 1;
            match memchr3(self.delimiter, b'\r', b'\n', &input[pos..]) {
                Some(i) => pos += i,
                None => pos = input.len(),
            }
        }

        // End of slice without a terminator.
        if in_quotes || !is_final {
            return None;
        }
        if after_quote {
            spans.push(FieldSpan {
                start: field_start,
                end: quote_end,
                quoted: true,
            });
        } else {
            spans.push(FieldSpan {
                start: field_start,
                end: input.len(),
                quoted: false,
            });
        }
        Some(ParsedRow { spans, consumed: input.len() })
    }

    /// Find the offset one past the next unquoted row terminator at or
    /// after `from`, tracking only quote state.
    ///
    /// This is the safe-split-point primitive for processing a large input
    /// in disjoint shards: start anywhere, call this to land on a row
    /// boundary, and hand each shard to an independent parser. Returns
    /// `None` when no unquoted terminator occurs in the rest of the slice.
    pub fn next_boundary(
        &self,
        input: &[u8],
        from: usize,
    ) -> Option<usize> {
        let mut pos = from;
        let mut in_quotes = false;
        while pos < input.len() {
            if in_quotes {
                let b = input[pos];
                if b == self.escape
                    && input.get(pos + 1) == Some(&self.quote)
                {
                    pos += 2;
                    continue;
                }
                if b == self.quote {
                    in_quotes = false;
                }
                pos += 1;
                continue;
            }
            match memchr3(self.quote, b'\r', b'\n', &input[pos..]) {
                None => return None,
                Some(i) => {
                    pos += i;
                    if input[pos] == self.quote {
                        in_quotes = true;
                        pos += 1;
                    } else {
                        return Some(self.consume_terminator(input, pos));
                    }
                }
            }
        }
        None
    }

    fn consume_terminator(&self, input: &[u8], pos: usize) -> usize {
        if input[pos] == b'\r' && input.get(pos + 1) == Some(&b'\n') {
            pos + 2
        } else {
            pos + 1
        }
    }
}

/// Collapse escape sequences in a quoted field's content bytes.
///
/// Every occurrence of the escape byte followed by the quote byte becomes a
/// single quote byte. Borrows the input untouched when it contains no escape
/// byte at all, so unescaping is free for the common case.
pub fn unescape<'a>(field: &'a [u8], quote: u8, escape: u8) -> Cow<'a, [u8]> {
    if memchr(escape, field).is_none() {
        return Cow::Borrowed(field);
    }
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;
    while i < field.len() {
        if field[i] == escape && field.get(i + 1) == Some(&quote) {
            out.push(quote);
            i += 2;
        } else {
            out.push(field[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::{unescape, RowParser, RowParserBuilder};

    // Drive the parser over the whole input as if it were the final chunk,
    // materializing each row's fields as strings.
    fn parse_all(parser: &RowParser, data: &str) -> Vec<Vec<String>> {
        let mut rows = vec![];
        let mut input = data.as_bytes();
        while let Some(parsed) = parser.parse_row(input, true) {
            let row = parsed
                .spans
                .iter()
                .map(|span| {
                    let raw = span.of(input);
                    let bytes = if span.quoted {
                        unescape(raw, parser.quote(), parser.escape())
                    } else {
                        raw.into()
                    };
                    String::from_utf8(bytes.into_owned()).unwrap()
                })
                .collect();
            rows.push(row);
            input = &input[parsed.consumed..];
        }
        rows
    }

    macro_rules! csv {
        ($([$($field:expr),*]),*) => {{
            let rows: Vec<Vec<String>> = vec![
                $(vec![$($field.to_string()),*]),*
            ];
            rows
        }}
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |builder| builder);
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                let mut builder = RowParserBuilder::new();
                $config(&mut builder);
                let parser = builder.build();
                let got = parse_all(&parser, $data);
                let expected = $expected;
                assert_eq!(expected, got);
            }
        };
    }

    parses_to!(one_row_one_field, "a", csv![["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_lf, "a\n", csv![["a"]]);
    parses_to!(one_row_many_fields_lf, "a,b,c\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_one_field_crlf, "a\r\n", csv![["a"]]);
    parses_to!(one_row_many_fields_crlf, "a,b,c\r\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_one_field_cr, "a\r", csv![["a"]]);

    parses_to!(many_rows_one_field, "a\nb", csv![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields,
        "a,b,c\nx,y,z",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_trailing_comma,
        "a,b,\nx,y,",
        csv![["a", "b", ""], ["x", "y", ""]]
    );
    parses_to!(many_rows_crlf, "a\r\nb\r\n", csv![["a"], ["b"]]);
    parses_to!(many_rows_cr, "a\rb\r", csv![["a"], ["b"]]);

    // Blank lines are rows with a single empty field; this parser does not
    // skip them.
    parses_to!(blank_line, "a\n\nb", csv![["a"], [""], ["b"]]);
    parses_to!(lone_lf, "\n", csv![[""]]);

    parses_to!(empty, "", csv![]);

    parses_to!(quote_empty, "\"\"", csv![[""]]);
    parses_to!(quote_lf, "\"\"\n", csv![[""]]);
    parses_to!(quote_space, "\" \"", csv![[" "]]);
    parses_to!(quote_inner_space, "\" a \"", csv![[" a "]]);
    parses_to!(quote_outer_space, "  \"a\"  ", csv![["  \"a\"  "]]);
    parses_to!(
        quote_multiline,
        "\"l1\nl2\",x",
        csv![["l1\nl2", "x"]]
    );
    parses_to!(
        quote_embedded_crlf,
        "\"a\r\nb\",c\r\nd,e",
        csv![["a\r\nb", "c"], ["d", "e"]]
    );
    parses_to!(
        quote_embedded_delimiter,
        "\"a,b\",c",
        csv![["a,b", "c"]]
    );

    parses_to!(
        doubled_quote,
        "\"She said \"\"Hello\"\"\"",
        csv![["She said \"Hello\""]]
    );
    parses_to!(
        doubled_quote_mid_row,
        "\"a\"\"b\",c",
        csv![["a\"b", "c"]]
    );
    parses_to!(
        escape_distinct,
        "\"a\\\"b\"",
        csv![["a\"b"]],
        |b: &mut RowParserBuilder| {
            b.escape(b'\\');
        }
    );

    // A quote byte that is not the first byte of a field is content.
    parses_to!(quote_mid_field, "a\"b,c", csv![["a\"b", "c"]]);

    // Junk after a closing quote is absorbed; the field ends at the quote.
    parses_to!(junk_after_quote, "\"a\"x,b", csv![["a", "b"]]);
    parses_to!(junk_after_quote_term, "\"a\"xy\nb", csv![["a"], ["b"]]);

    parses_to!(
        delimiter_tab,
        "a\tb",
        csv![["a", "b"]],
        |b: &mut RowParserBuilder| {
            b.delimiter(b'\t');
        }
    );
    parses_to!(
        quote_change,
        "za,bz,c",
        csv![["a,b", "c"]],
        |b: &mut RowParserBuilder| {
            b.quote(b'z');
        }
    );

    #[test]
    fn incomplete_without_terminator() {
        let parser = RowParser::new();
        assert_eq!(parser.parse_row(b"a,b", false), None);
        assert_eq!(parser.parse_row(b"a,b,", false), None);
    }

    #[test]
    fn incomplete_is_idempotent() {
        let parser = RowParser::new();
        let input = b"\"partial field";
        let first = parser.parse_row(input, false);
        let second = parser.parse_row(input, false);
        assert_eq!(first, None);
        assert_eq!(second, None);
    }

    #[test]
    fn unclosed_quote_never_completes() {
        let parser = RowParser::new();
        // Even on the final chunk an unclosed quote is not a row.
        assert_eq!(parser.parse_row(b"\"abc", true), None);
        assert_eq!(parser.parse_row(b"x,\"abc\ndef", true), None);
    }

    #[test]
    fn final_chunk_flushes_trailing_row() {
        let parser = RowParser::new();
        let parsed = parser.parse_row(b"x,y", true).unwrap();
        assert_eq!(parsed.consumed, 3);
        assert_eq!(parsed.spans.len(), 2);
        assert_eq!(parsed.spans[0].of(b"x,y"), b"x");
        assert_eq!(parsed.spans[1].of(b"x,y"), b"y");
    }

    #[test]
    fn final_chunk_trailing_quoted_field() {
        let parser = RowParser::new();
        let input = b"\"Line 1\nLine 2\",42";
        let parsed = parser.parse_row(input, true).unwrap();
        assert_eq!(parsed.consumed, input.len());
        assert_eq!(parsed.spans.len(), 2);
        assert!(parsed.spans[0].quoted);
        assert_eq!(parsed.spans[0].of(input), b"Line 1\nLine 2");
        assert_eq!(parsed.spans[1].of(input), b"42");
    }

    #[test]
    fn empty_slice_is_never_a_row() {
        let parser = RowParser::new();
        assert_eq!(parser.parse_row(b"", false), None);
        assert_eq!(parser.parse_row(b"", true), None);
    }

    #[test]
    fn crlf_consumed_as_one_terminator() {
        let parser = RowParser::new();
        let parsed = parser.parse_row(b"a\r\nb", false).unwrap();
        assert_eq!(parsed.consumed, 3);
    }

    #[test]
    fn cr_at_slice_end_consumed_alone() {
        let parser = RowParser::new();
        // The paired LF may not have arrived; the caller handles that.
        let parsed = parser.parse_row(b"a,b\r", false).unwrap();
        assert_eq!(parsed.consumed, 4);
        assert_eq!(parsed.spans.len(), 2);
    }

    #[test]
    fn quoted_spans_exclude_quotes() {
        let parser = RowParser::new();
        let input = b"\"abc\",d\n";
        let parsed = parser.parse_row(input, false).unwrap();
        assert_eq!(parsed.spans[0].start, 1);
        assert_eq!(parsed.spans[0].end, 4);
        assert!(parsed.spans[0].quoted);
        assert!(!parsed.spans[1].quoted);
    }

    #[test]
    fn boundary_simple() {
        let parser = RowParser::new();
        let input = b"a,b\nc,d\ne";
        assert_eq!(parser.next_boundary(input, 0), Some(4));
        assert_eq!(parser.next_boundary(input, 4), Some(8));
        assert_eq!(parser.next_boundary(input, 8), None);
    }

    #[test]
    fn boundary_skips_quoted_terminators() {
        let parser = RowParser::new();
        let input = b"\"a\nb\",c\nd";
        assert_eq!(parser.next_boundary(input, 0), Some(8));
    }

    #[test]
    fn boundary_crlf() {
        let parser = RowParser::new();
        let input = b"a\r\nb";
        assert_eq!(parser.next_boundary(input, 0), Some(3));
    }

    #[test]
    fn unescape_borrows_when_clean() {
        use std::borrow::Cow;
        match unescape(b"plain", b'"', b'"') {
            Cow::Borrowed(b) => assert_eq!(b, b"plain"),
            Cow::Owned(_) => panic!("expected a borrow"),
        }
    }

    #[test]
    fn unescape_doubled() {
        assert_eq!(
            unescape(b"a\"\"b", b'"', b'"').as_ref(),
            b"a\"b" as &[u8]
        );
    }

    #[test]
    fn unescape_distinct_escape() {
        assert_eq!(
            unescape(b"a\\\"b", b'"', b'\\').as_ref(),
            b"a\"b" as &[u8]
        );
        // A lone escape byte not followed by a quote is content.
        assert_eq!(
            unescape(b"a\\b", b'"', b'\\').as_ref(),
            b"a\\b" as &[u8]
        );
    }
}
