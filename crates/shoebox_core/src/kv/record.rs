//! Commit log record framing.
//!
//! Every committed batch is one record:
//!
//! ```text
//! magic "SHBX" | version u16 | payload len u32 | crc32 u32 | payload
//! payload = sequence u64 | entry count u32 | entries
//! entry   = op u8 | key len u32 | key | (value len u32 | value)   -- value for puts only
//! ```
//!
//! All integers are little-endian. A record whose header or checksum does
//! not verify marks the end of the usable log.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;

/// Magic bytes identifying a batch record.
pub const RECORD_MAGIC: [u8; 4] = *b"SHBX";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 4 + 2 + 4 + 4;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// One committed batch of puts and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    /// Sequence number assigned at commit.
    pub sequence: SequenceNumber,
    /// Key → new value, `None` for deletes.
    pub entries: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

/// Outcome of decoding the record at some log offset.
#[derive(Debug)]
pub enum Decoded {
    /// A complete, verified record and its total encoded length.
    Record(BatchRecord, usize),
    /// The bytes at this offset are a torn or corrupt tail.
    Torn(String),
}

impl BatchRecord {
    /// Encodes the record with its header.
    ///
    /// # Errors
    ///
    /// Returns an error if a key, value or the payload exceeds `u32::MAX`
    /// bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        payload.extend_from_slice(&len_u32(self.entries.len())?.to_le_bytes());

        for (key, value) in &self.entries {
            match value {
                Some(value) => {
                    payload.push(OP_PUT);
                    payload.extend_from_slice(&len_u32(key.len())?.to_le_bytes());
                    payload.extend_from_slice(key);
                    payload.extend_from_slice(&len_u32(value.len())?.to_le_bytes());
                    payload.extend_from_slice(value);
                }
                None => {
                    payload.push(OP_DELETE);
                    payload.extend_from_slice(&len_u32(key.len())?.to_le_bytes());
                    payload.extend_from_slice(key);
                }
            }
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        out.extend_from_slice(&len_u32(payload.len())?.to_le_bytes());
        out.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes the record starting at the beginning of `buf`.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Decoded {
        if buf.len() < HEADER_SIZE {
            return Decoded::Torn(format!("{} bytes left, header needs {HEADER_SIZE}", buf.len()));
        }
        if buf[0..4] != RECORD_MAGIC {
            return Decoded::Torn("bad magic".into());
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != RECORD_VERSION {
            return Decoded::Torn(format!("unsupported record version {version}"));
        }
        let len = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;
        let crc = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
        let Some(payload) = buf.get(HEADER_SIZE..HEADER_SIZE + len) else {
            return Decoded::Torn(format!("payload of {len} bytes is truncated"));
        };
        let actual = compute_crc32(payload);
        if actual != crc {
            return Decoded::Torn(format!(
                "checksum mismatch: expected {crc:08x}, got {actual:08x}"
            ));
        }
        match decode_payload(payload) {
            Ok(record) => Decoded::Record(record, HEADER_SIZE + len),
            Err(e) => Decoded::Torn(e.to_string()),
        }
    }
}

fn len_u32(len: usize) -> CoreResult<u32> {
    u32::try_from(len)
        .map_err(|_| CoreError::invalid_operation(format!("{len} bytes exceeds record limit")))
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| CoreError::log_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }
}

fn decode_payload(payload: &[u8]) -> CoreResult<BatchRecord> {
    let mut reader = PayloadReader { payload, cursor: 0 };

    let sequence = reader.u64()?;
    let count = reader.u32()? as usize;
    let mut entries = Vec::with_capacity(count.min(4096));

    for _ in 0..count {
        let op = reader.take(1)?[0];
        let key_len = reader.u32()? as usize;
        let key = reader.take(key_len)?.to_vec();
        let value = match op {
            OP_PUT => {
                let value_len = reader.u32()? as usize;
                Some(reader.take(value_len)?.to_vec())
            }
            OP_DELETE => None,
            other => {
                return Err(CoreError::log_corruption(format!("unknown entry op {other}")));
            }
        };
        entries.push((key, value));
    }

    if reader.cursor != payload.len() {
        return Err(CoreError::log_corruption(format!(
            "trailing bytes in batch: used {} of {}",
            reader.cursor,
            payload.len()
        )));
    }

    Ok(BatchRecord {
        sequence: SequenceNumber::new(sequence),
        entries,
    })
}

/// Computes the IEEE CRC32 checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
