/*!
`csvflow-core` provides incremental CSV row recognition over raw byte slices.

The centerpiece is [`RowParser`]: given a contiguous slice of buffered bytes
and a flag saying whether any more bytes can ever arrive, it recognizes at
most one row starting at offset 0 and reports the field boundaries along with
how many bytes it consumed. It allocates nothing but the span list and never
copies field data; callers slice the input themselves, unescaping lazily with
[`unescape`] when a field value is actually needed.

The parser is deliberately lenient. Like most CSV readers that survive
contact with real data, it prefers *a* parse over *no* parse: malformed
quoting is absorbed rather than rejected, and no input ever produces an
error. See [`RowParser::parse_row`] for the precise rules.
*/

pub use crate::parser::{
    unescape, FieldSpan, ParsedRow, RowParser, RowParserBuilder,
};

mod parser;
