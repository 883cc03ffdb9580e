use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::protocol::version::{ProtocolVersion, UNKNOWN_VERSION};
use crate::wire::{Decode, Encode};

/// A growable byte buffer with independent read and write cursors.
///
/// All integral fields are encoded little-endian; the protocol targets
/// homogeneous little-endian deployments and performs no byte swapping
/// beyond that. Variable-length fields carry a `u32` length prefix.
///
/// Every buffer carries a protocol-version tag. Version-aware codecs
/// consult it to pick between the current layout and a frozen legacy
/// layout; it stays [`UNKNOWN_VERSION`] until a peer handshake completes.
pub struct MessageBuffer {
    storage: Vec<u8>,
    wpos: usize,
    rpos: usize,
    version: ProtocolVersion,
}

impl MessageBuffer {
    #[inline]
    pub fn new() -> MessageBuffer {
        MessageBuffer {
            storage: Vec::new(),
            wpos: 0,
            rpos: 0,
            version: UNKNOWN_VERSION,
        }
    }

    /// Wraps an already-received frame for reading.
    #[inline]
    pub fn from_vec(storage: Vec<u8>) -> MessageBuffer {
        let wpos = storage.len();
        MessageBuffer {
            storage,
            wpos,
            rpos: 0,
            version: UNKNOWN_VERSION,
        }
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[inline]
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Number of bytes between the read cursor and the end of the data.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.wpos - self.rpos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.wpos
    }

    /// Hands out the underlying storage, e.g. for transmission.
    #[inline]
    pub fn release_storage(self) -> Vec<u8> {
        self.storage
    }

    /// Overwrites previously written bytes in place. Used by the envelope to
    /// finalize the size prefix after the payload has been encoded.
    #[inline]
    pub(crate) fn patch_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.storage[offset..offset + 4], value);
    }

    #[inline]
    pub(crate) fn read_pos(&self) -> usize {
        self.rpos
    }

    #[inline]
    pub(crate) fn set_read_pos(&mut self, pos: usize) {
        self.rpos = pos;
    }

    #[inline]
    fn grow_for(&mut self, additional: usize) -> &mut [u8] {
        let start = self.wpos;
        self.storage.resize(start + additional, 0);
        self.wpos += additional;
        &mut self.storage[start..]
    }

    #[inline]
    fn take(&mut self, count: usize) -> Result<&[u8]> {
        if self.rpos + count > self.wpos {
            return Err(Error::EndOfBuffer);
        }

        let slice = &self.storage[self.rpos..self.rpos + count];
        self.rpos += count;
        Ok(slice)
    }
}

/// Integral primitives.
impl MessageBuffer {
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.grow_for(1)[0] = value;
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        LittleEndian::write_u16(self.grow_for(2), value);
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        LittleEndian::write_u32(self.grow_for(4), value);
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        LittleEndian::write_u64(self.grow_for(8), value);
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        LittleEndian::write_i64(self.grow_for(8), value);
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        LittleEndian::write_i32(self.grow_for(4), value);
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }
}

/// Strings, byte sequences, fixed arrays and maps.
impl MessageBuffer {
    /// `u32` length prefix followed by the raw UTF-8 bytes, no terminator.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.grow_for(value.len()).copy_from_slice(value.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?.to_vec();

        String::from_utf8(bytes).map_err(|_| Error::Protocol("string field is not valid UTF-8".to_string()))
    }

    /// `u32` length prefix followed by the raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_u32(value.len() as u32);
        self.grow_for(value.len()).copy_from_slice(value);
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Fixed-size array: elements in order, no length prefix.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.grow_for(value.len()).copy_from_slice(value);
    }

    pub fn read_raw(&mut self, target: &mut [u8]) -> Result<()> {
        target.copy_from_slice(self.take(target.len())?);
        Ok(())
    }

    /// `u32` element count followed by the elements in order.
    pub fn write_seq<T: Encode>(&mut self, items: &[T]) {
        self.write_u32(items.len() as u32);
        for item in items {
            item.encode(self);
        }
    }

    pub fn read_seq<T: Decode>(&mut self) -> Result<Vec<T>> {
        let count = self.read_len()?;
        let mut items = Vec::with_capacity(count.min(self.remaining()));

        for _ in 0..count {
            items.push(T::decode(self)?);
        }

        Ok(items)
    }

    /// Ordered `string -> string` mapping: `u32` count, then `(key, value)` pairs.
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) {
        self.write_u32(map.len() as u32);
        for (key, value) in map {
            self.write_string(key);
            self.write_string(value);
        }
    }

    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.read_len()?;
        let mut map = BTreeMap::new();

        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }

        Ok(map)
    }

    /// Duration encoded as its nanosecond count.
    pub fn write_duration(&mut self, value: Duration) {
        self.write_i64(value.as_nanos() as i64);
    }

    pub fn read_duration(&mut self) -> Result<Duration> {
        let nanos = self.read_i64()?;
        if nanos < 0 {
            return Err(Error::Protocol("negative duration on the wire".to_string()));
        }
        Ok(Duration::from_nanos(nanos as u64))
    }

    /// Time point encoded as signed nanoseconds since the unix epoch.
    pub fn write_time(&mut self, value: SystemTime) {
        let nanos = match value.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_nanos() as i64,
            Err(before) => -(before.duration().as_nanos() as i64),
        };
        self.write_i64(nanos);
    }

    pub fn read_time(&mut self) -> Result<SystemTime> {
        let nanos = self.read_i64()?;
        let time = if nanos >= 0 {
            UNIX_EPOCH + Duration::from_nanos(nanos as u64)
        } else {
            UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
        };
        Ok(time)
    }

    /// Reads a length prefix, bounded by the remaining frame size so that a
    /// corrupt prefix cannot trigger an oversized allocation.
    #[inline]
    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(Error::EndOfBuffer);
        }
        Ok(len)
    }
}

impl Encode for String {
    #[inline]
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(self);
    }
}

impl Decode for String {
    #[inline]
    fn decode(buffer: &mut MessageBuffer) -> Result<String> {
        buffer.read_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_roundtrip() {
        let mut buffer = MessageBuffer::new();
        buffer.write_u8(0xab);
        buffer.write_u16(0xbeef);
        buffer.write_u32(0xdead_beef);
        buffer.write_u64(0x0123_4567_89ab_cdef);
        buffer.write_i64(-42);
        buffer.write_i32(-7);
        buffer.write_bool(true);

        assert_eq!(buffer.read_u8().unwrap(), 0xab);
        assert_eq!(buffer.read_u16().unwrap(), 0xbeef);
        assert_eq!(buffer.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(buffer.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(buffer.read_i64().unwrap(), -42);
        assert_eq!(buffer.read_i32().unwrap(), -7);
        assert_eq!(buffer.read_bool().unwrap(), true);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buffer = MessageBuffer::new();
        buffer.write_u32(0x0403_0201);

        assert_eq!(buffer.release_storage(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_read_underflow() {
        let mut buffer = MessageBuffer::from_vec(vec![1, 2]);

        assert_eq!(buffer.read_u32().unwrap_err(), Error::EndOfBuffer);
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buffer = MessageBuffer::new();
        buffer.write_string("CAN1");
        buffer.write_string("");

        assert_eq!(buffer.read_string().unwrap(), "CAN1");
        assert_eq!(buffer.read_string().unwrap(), "");
    }

    #[test]
    fn test_string_length_exceeds_frame() {
        let mut buffer = MessageBuffer::new();
        buffer.write_u32(1000);
        buffer.write_raw(&[b'x'; 4]);

        assert_eq!(buffer.read_string().unwrap_err(), Error::EndOfBuffer);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buffer = MessageBuffer::new();
        buffer.write_bytes(&[0xff, 0xfe]);

        assert!(matches!(buffer.read_string().unwrap_err(), Error::Protocol(_)));
    }

    #[test]
    fn test_bytes_and_raw() {
        let mut buffer = MessageBuffer::new();
        buffer.write_bytes(&[1, 2, 3]);
        buffer.write_raw(&[9, 9]);

        assert_eq!(buffer.read_bytes().unwrap(), vec![1, 2, 3]);

        let mut fixed = [0u8; 2];
        buffer.read_raw(&mut fixed).unwrap();
        assert_eq!(fixed, [9, 9]);
    }

    #[test]
    fn test_seq_roundtrip() {
        let names = vec!["a".to_string(), "bc".to_string()];

        let mut buffer = MessageBuffer::new();
        buffer.write_seq(&names);

        assert_eq!(buffer.read_seq::<String>().unwrap(), names);
    }

    #[test]
    fn test_string_map_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("controllerType".to_string(), "DataPublisher".to_string());
        map.insert("topic".to_string(), "T".to_string());

        let mut buffer = MessageBuffer::new();
        buffer.write_string_map(&map);

        assert_eq!(buffer.read_string_map().unwrap(), map);
    }

    #[test]
    fn test_duration_and_time() {
        let mut buffer = MessageBuffer::new();
        buffer.write_duration(Duration::from_micros(1500));

        let stamp = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        buffer.write_time(stamp);

        assert_eq!(buffer.read_duration().unwrap(), Duration::from_micros(1500));
        assert_eq!(buffer.read_time().unwrap(), stamp);
    }

    #[test]
    fn test_pre_epoch_time() {
        let stamp = UNIX_EPOCH - Duration::from_secs(3600);

        let mut buffer = MessageBuffer::new();
        buffer.write_time(stamp);

        assert_eq!(buffer.read_time().unwrap(), stamp);
    }

    #[test]
    fn test_version_tag_defaults_to_unknown() {
        let buffer = MessageBuffer::new();
        assert_eq!(buffer.version(), UNKNOWN_VERSION);
    }
}
