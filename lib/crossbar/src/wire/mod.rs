//! Binary wire format: the cursor-based [`MessageBuffer`](buffer::MessageBuffer)
//! with its field primitives, and the length-prefixed
//! [`SerializedMessage`](envelope::SerializedMessage) envelope that frames every
//! message on every transport.

pub mod buffer;
pub mod envelope;

use crate::error::Result;
use buffer::MessageBuffer;

/// Field-by-field serialization into a [`MessageBuffer`]. Writing can always
/// succeed because the buffer grows on demand.
pub trait Encode {
    fn encode(&self, buffer: &mut MessageBuffer);
}

/// Field-by-field deserialization from a [`MessageBuffer`]. Fails with
/// `Error::EndOfBuffer` when the frame is truncated.
pub trait Decode: Sized {
    fn decode(buffer: &mut MessageBuffer) -> Result<Self>;
}
