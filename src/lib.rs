/*! # bitpack

Bitpacked binary serialization for multiplayer netcode.

Fields are packed at arbitrary bit widths into little-endian 32-bit words
with no per-field metadata: no tags, no lengths, no framing. The reader
must apply the exact same field sequence as the writer, which this crate
enforces structurally: a single user routine, generic over the stream
mode, both encodes and decodes (and measures) a value:

```rust
use bitpack::{decode, encode, Result, Stream, Streamable};

struct Player {
    health: i32,
    position: f32,
}

impl Streamable for Player {
    fn serialize<S: Stream>(&mut self, stream: &mut S) -> Result<()> {
        stream.serialize_int(&mut self.health, 0, 100)?;
        stream.serialize_f32(&mut self.position)?;
        Ok(())
    }
}

let mut buffer = [0u8; 64];
let mut player = Player { health: 75, position: 12.5 };
let written = encode(&mut player, &mut buffer)?;

let mut received = Player { health: 0, position: 0.0 };
decode(&mut received, &buffer[..written])?;
assert_eq!(received.health, 75);
# Ok::<(), bitpack::SerializationError>(())
```

Buffers are caller-supplied; the crate performs no I/O and keeps no state
beyond the stream driving a single message. Decoding never panics on
hostile input: truncated buffers, non-zero alignment padding and
out-of-range field payloads all reject the frame with an error the caller
treats as a dropped packet.

Big-endian hosts are not supported as a wire target; the format is
little-endian by definition.
*/

mod bits;
mod error;
mod reader;
mod stream;
mod writer;

pub use bits::{bits_required, log2};
pub use error::{Result, SerializationError};
pub use reader::BitReader;
pub use stream::{
    decode, encode, measure, MeasureStream, ReadStream, Stream, Streamable, WriteStream,
};
pub use writer::BitWriter;

pub mod prelude {
    pub use crate::error::{Result, SerializationError};
    pub use crate::stream::{
        decode, encode, measure, MeasureStream, ReadStream, Stream, Streamable, WriteStream,
    };
}
