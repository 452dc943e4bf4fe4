/*!
The `csvflow` crate provides streaming CSV reading and writing in bounded
memory.

The reader pulls bytes from any [`io::Read`](std::io::Read) in chunks,
stitches rows that straddle chunk boundaries back together, and yields each
row as soon as its terminator (or the end of the stream) proves it complete.
Memory use is bounded by the largest single row, not by the input, so
multi-gigabyte files stream comfortably. Chunk sizes adapt to the data:
wide rows promote the fetch size up a ladder, narrow rows eventually demote
it.

Fields are tracked as byte ranges into the row and materialized lazily:
unquoting, escape expansion and UTF-8 validation happen only for the fields
a consumer actually asks for.

The low-level row recognizer lives in the `csvflow-core` crate, which is
re-exported here as [`core`]. It knows nothing about I/O and can be used on
its own wherever the caller already has bytes in hand.

# Example

This example reads CSV from stdin and prints the second column of each row.

```no_run
use std::{error::Error, io, process};

use csvflow::Reader;

fn run() -> Result<(), Box<dyn Error>> {
    let mut rdr = Reader::from_reader(io::stdin());
    while let Some(row) = rdr.read_row()? {
        if let Some(field) = row.get_str(1) {
            println!("{}", field?);
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        println!("{}", err);
        process::exit(1);
    }
}
```

Writing goes through [`Writer`], which quotes fields only when their
content requires it:

```
use csvflow::Writer;

let mut out = vec![];
let mut wtr = Writer::from_writer(&mut out);
wtr.write_row(&["name", "notes"]).unwrap();
wtr.write_row(&["widget", "3\" long, anodized"]).unwrap();
wtr.flush().unwrap();
drop(wtr);
assert_eq!(
    out,
    b"name,notes\nwidget,\"3\"\" long, anodized\"\n"
);
```
*/

pub use csvflow_core as core;

pub use crate::buffer::StreamBuffer;
pub use crate::error::{Error, Result};
pub use crate::reader::{Reader, ReaderBuilder, Rows};
pub use crate::record::{Fields, Row};
pub use crate::sizer::{ChunkSizer, SIZE_CLASSES};
pub use crate::writer::{ToField, Writer, WriterBuilder};

mod buffer;
mod error;
mod reader;
mod record;
mod sizer;
mod writer;
