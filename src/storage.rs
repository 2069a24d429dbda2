// © 2019 3D Robotics. License: Apache-2.0
use async_stream::try_stream;
use bytes::{Bytes, BytesMut, BufMut};
use futures::StreamExt;
use serde_derive::Deserialize;
use crate::source::BoxBytesStream;

/// Maximum payload of a single DEFLATE stored block.
const STORED_BLOCK_MAX: usize = 0xFFFF;

/// How an entry's bytes are packaged on the wire.
///
/// Neither variant compresses anything. `Deflated` frames the input as
/// DEFLATE stored blocks, for producers whose consumers expect method 8;
/// its wire length is still a pure function of the input length, which is
/// what makes the archive size computable up front.
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Stored,
    Deflated,
}

impl Default for Storage {
    fn default() -> Storage {
        Storage::Stored
    }
}

impl Storage {
    /// Compression method code written in the zip headers.
    pub fn method_code(self) -> u16 {
        match self {
            Storage::Stored => 0,
            Storage::Deflated => 8,
        }
    }

    /// Exact number of bytes the wire form occupies for `len` input bytes.
    pub fn wire_length(self, len: u64) -> u64 {
        match self {
            Storage::Stored => len,
            Storage::Deflated => {
                // One 5-byte block header per started block; the empty
                // input still produces a single empty final block.
                let blocks = ((len + STORED_BLOCK_MAX as u64 - 1) / STORED_BLOCK_MAX as u64).max(1);
                5 * blocks + len
            }
        }
    }

    /// Transform a stream of input chunks into the on-the-wire chunk
    /// sequence. The output lengths sum to `wire_length` of the input
    /// lengths' sum; chunk boundaries carry no meaning.
    pub fn wrap(self, input: BoxBytesStream) -> BoxBytesStream {
        match self {
            Storage::Stored => input,
            Storage::Deflated => Box::pin(try_stream! {
                let mut input = input;
                let mut pending = BytesMut::new();

                while let Some(chunk) = input.next().await {
                    pending.extend_from_slice(&chunk?);

                    // A full-size block is only non-final when at least one
                    // more byte follows it.
                    while pending.len() > STORED_BLOCK_MAX {
                        yield stored_block(&pending.split_to(STORED_BLOCK_MAX), false);
                    }
                }

                yield stored_block(&pending, true);
            }),
        }
    }
}

/// One DEFLATE stored block: BFINAL/BTYPE header byte padded to a byte
/// boundary, LEN, NLEN, then the raw payload.
fn stored_block(payload: &[u8], last: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(last as u8); // BFINAL in bit 0, BTYPE=00
    buf.put_u16_le(payload.len() as u16);
    buf.put_u16_le(!(payload.len() as u16));
    buf.put_slice(payload);
    buf.freeze()
}
