//! Binary record format shared by WAL and snapshot files
//!
//! Every record is a ChunkHeader (32 bytes) followed by a payload:
//! key_len(u16) + value_len(u32) + operation(u8) + padding(u8) + key_bytes + value_bytes
//!
//! A `Batch` record has an empty key; its value is an encoded list of
//! puts and deletes covered by the one header checksum.

use std::path::PathBuf;

use crate::batch::BatchOp;
use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying a record: "RCLT" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = [0x52, 0x43, 0x4C, 0x54];

/// Largest key the record layout can carry
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// Largest value the record layout can carry
pub const MAX_VALUE_SIZE: usize = (u32::MAX - 64) as usize;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Fixed fields at the start of every payload
const PAYLOAD_PREFIX: usize = 8;

/// Record operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Insert or update a key-value pair
    Put = 1,
    /// Delete a key
    Delete = 2,
    /// Several puts and deletes applied atomically
    Batch = 3,
}

impl Operation {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Operation::Put),
            2 => Some(Operation::Delete),
            3 => Some(Operation::Batch),
            _ => None,
        }
    }
}

/// Fixed-size header for each record
///
/// Layout:
///   [0..4]   magic:      [u8;4] - "RCLT"
///   [4..8]   length:     u32    - payload length in bytes
///   [8..12]  checksum:   u32    - CRC32C of payload bytes
///   [12]     entry_type: u8     - operation type
///   [13..32] reserved, zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub entry_type: u8,
}

impl ChunkHeader {
    pub fn new(length: u32, checksum: u32, entry_type: Operation) -> Self {
        Self {
            magic: MAGIC_ARRAY,
            length,
            checksum,
            entry_type: entry_type as u8,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.entry_type;
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Self {
            magic,
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            entry_type: bytes[12],
        }
    }
}

/// A decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub operation: Operation,
}

fn corrupted(offset: usize, reason: String) -> StoreError {
    StoreError::WalCorrupted {
        path: PathBuf::from("<buffer>"),
        offset: offset as u64,
        reason,
    }
}

/// Serialize a key-value pair into a complete record
pub fn serialize_entry(key: &[u8], value: &[u8], op: Operation) -> StoreResult<Vec<u8>> {
    // Size checks come before any allocation
    if key.len() > MAX_KEY_SIZE {
        return Err(StoreError::OversizedEntry {
            entry_size: key.len() as u64,
            max_size: MAX_KEY_SIZE as u64,
            component: "key".to_string(),
        });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::OversizedEntry {
            entry_size: value.len() as u64,
            max_size: MAX_VALUE_SIZE as u64,
            component: "value".to_string(),
        });
    }

    let payload_size = PAYLOAD_PREFIX + key.len() + value.len();

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload_size);
    buffer.resize(HEADER_SIZE, 0);
    buffer.extend_from_slice(&(key.len() as u16).to_le_bytes());
    buffer.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buffer.push(op as u8);
    buffer.push(0);
    buffer.extend_from_slice(key);
    buffer.extend_from_slice(value);

    let checksum = crc32c::crc32c(&buffer[HEADER_SIZE..]);
    let header = ChunkHeader::new(payload_size as u32, checksum, op);
    buffer[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    Ok(buffer)
}

/// Deserialize a record from the start of a byte slice
pub fn deserialize_entry(data: &[u8]) -> StoreResult<WalEntry> {
    if data.len() < HEADER_SIZE {
        return Err(corrupted(
            0,
            format!("Entry too short: {} bytes, need at least {}", data.len(), HEADER_SIZE),
        ));
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = ChunkHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(StoreError::NoMagicFound {
            path: PathBuf::from("<buffer>"),
            offset: 0,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: PathBuf::from("<buffer>"),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: PathBuf::from("<buffer>"),
            expected: header.checksum,
            actual: computed,
            offset: HEADER_SIZE as u64,
        });
    }

    if payload.len() < PAYLOAD_PREFIX {
        return Err(corrupted(HEADER_SIZE, "Payload too short for header fields".to_string()));
    }

    let key_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let value_len = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]) as usize;
    let operation = Operation::from_u8(payload[6]).ok_or_else(|| {
        corrupted(HEADER_SIZE + 6, format!("Invalid operation type: {}", payload[6]))
    })?;

    let key_end = PAYLOAD_PREFIX + key_len;
    let value_end = key_end + value_len;
    if payload.len() < value_end {
        return Err(corrupted(
            HEADER_SIZE,
            format!(
                "Payload too short: need {} bytes for key({}) + value({})",
                value_end, key_len, value_len
            ),
        ));
    }

    Ok(WalEntry {
        key: payload[PAYLOAD_PREFIX..key_end].to_vec(),
        value: payload[key_end..value_end].to_vec(),
        operation,
    })
}

/// Encode batch operations into the value of a `Batch` record.
///
/// Layout: count(u32) then per op: op(u8) + key_len(u16) + value_len(u32) + key + value
pub fn encode_batch(ops: &[BatchOp]) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + ops.iter().map(|op| 7 + op.encoded_len()).sum::<usize>());
    buf.extend_from_slice(&(ops.len() as u32).to_le_bytes());
    for op in ops {
        let (code, key, value): (Operation, &[u8], &[u8]) = match op {
            BatchOp::Put { key, value } => (Operation::Put, key.as_slice(), value.as_slice()),
            BatchOp::Delete { key } => (Operation::Delete, key.as_slice(), &[]),
        };
        if key.len() > MAX_KEY_SIZE {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: MAX_KEY_SIZE as u64,
                component: "key".to_string(),
            });
        }
        buf.push(code as u8);
        buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }
    if buf.len() > MAX_VALUE_SIZE {
        return Err(StoreError::OversizedEntry {
            entry_size: buf.len() as u64,
            max_size: MAX_VALUE_SIZE as u64,
            component: "batch".to_string(),
        });
    }
    Ok(buf)
}

/// Decode the value of a `Batch` record.
pub fn decode_batch(data: &[u8]) -> StoreResult<Vec<BatchOp>> {
    if data.len() < 4 {
        return Err(corrupted(0, "Batch too short for count".to_string()));
    }
    let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let mut ops = Vec::with_capacity(count.min(data.len() / 7));
    let mut pos = 4;

    for _ in 0..count {
        if pos + 7 > data.len() {
            return Err(corrupted(pos, "Batch op header truncated".to_string()));
        }
        let code = data[pos];
        let key_len = u16::from_le_bytes([data[pos + 1], data[pos + 2]]) as usize;
        let value_len =
            u32::from_le_bytes([data[pos + 3], data[pos + 4], data[pos + 5], data[pos + 6]]) as usize;
        let key_start = pos + 7;
        let value_start = key_start + key_len;
        let end = value_start + value_len;
        if end > data.len() {
            return Err(corrupted(pos, format!("Batch op at {} overruns batch", pos)));
        }
        let key = data[key_start..value_start].to_vec();
        match Operation::from_u8(code) {
            Some(Operation::Put) => ops.push(BatchOp::Put {
                key,
                value: data[value_start..end].to_vec(),
            }),
            Some(Operation::Delete) => ops.push(BatchOp::Delete { key }),
            _ => return Err(corrupted(pos, format!("Invalid batch op type: {}", code))),
        }
        pos = end;
    }

    Ok(ops)
}
