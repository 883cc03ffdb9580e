//! Generic publish/subscribe payloads.

use crate::error::Result;
use crate::messages::SimTime;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// An opaque publication on a data topic.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DataMessageEvent {
    pub timestamp: SimTime,
    pub data: Vec<u8>,
}

impl Encode for DataMessageEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        // Wire order is data-first; kept for compatibility with existing
        // captures.
        buffer.write_bytes(&self.data);
        buffer.write_i64(self.timestamp);
    }
}

impl Decode for DataMessageEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<DataMessageEvent> {
        let data = buffer.read_bytes()?;
        let timestamp = buffer.read_i64()?;

        Ok(DataMessageEvent { timestamp, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_message_roundtrip() {
        let event = DataMessageEvent {
            timestamp: 12_345,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };

        let mut buffer = MessageBuffer::new();
        event.encode(&mut buffer);

        assert_eq!(DataMessageEvent::decode(&mut buffer).unwrap(), event);
    }

    #[test]
    fn test_data_precedes_timestamp_on_wire() {
        let event = DataMessageEvent {
            timestamp: 1,
            data: vec![7],
        };

        let mut buffer = MessageBuffer::new();
        event.encode(&mut buffer);

        let bytes = buffer.release_storage();
        // u32 length prefix, then the single payload byte.
        assert_eq!(&bytes[..5], &[1, 0, 0, 0, 7]);
    }
}
