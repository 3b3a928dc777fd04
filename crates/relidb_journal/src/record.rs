//! Journal record types and framing.

use crate::error::{JournalError, JournalResult};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"RJNL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + type (1) + length (4).
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing CRC size.
pub(crate) const CRC_SIZE: usize = 4;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    Write = 1,
    Delete = 2,
    Commit = 3,
}

impl RecordType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Write),
            2 => Some(Self::Delete),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// A single change-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// A key was written with the given payload.
    Write {
        /// Full log key (`bucket "::" key`).
        key: Vec<u8>,
        /// The written payload.
        payload: Vec<u8>,
    },

    /// A key was deleted.
    Delete {
        /// Full log key (`bucket "::" key`).
        key: Vec<u8>,
    },

    /// Marker sealing the records staged since the previous marker.
    Commit {
        /// Number of records covered by this marker.
        records: u32,
    },
}

impl JournalRecord {
    /// Maximum encoded payload size. The frame length field is 4 bytes.
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    fn record_type(&self) -> RecordType {
        match self {
            Self::Write { .. } => RecordType::Write,
            Self::Delete { .. } => RecordType::Delete,
            Self::Commit { .. } => RecordType::Commit,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Write { key, payload } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(payload);
            }
            Self::Delete { key } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
            Self::Commit { records } => {
                buf.extend_from_slice(&records.to_le_bytes());
            }
        }
        buf
    }

    fn decode_payload(record_type: RecordType, payload: &[u8]) -> JournalResult<Self> {
        match record_type {
            RecordType::Write | RecordType::Delete => {
                if payload.len() < 4 {
                    return Err(JournalError::corrupted("record payload too short"));
                }
                let key_len =
                    u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
                let rest = &payload[4..];
                if key_len > rest.len() {
                    return Err(JournalError::corrupted("record key overruns payload"));
                }
                let key = rest[..key_len].to_vec();
                match record_type {
                    RecordType::Write => Ok(Self::Write {
                        key,
                        payload: rest[key_len..].to_vec(),
                    }),
                    _ => {
                        if rest.len() != key_len {
                            return Err(JournalError::corrupted("delete record has trailing bytes"));
                        }
                        Ok(Self::Delete { key })
                    }
                }
            }
            RecordType::Commit => {
                if payload.len() != 4 {
                    return Err(JournalError::corrupted("commit record has wrong size"));
                }
                Ok(Self::Commit {
                    records: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }
        }
    }

    /// Encodes the record as a framed byte sequence.
    ///
    /// Frame layout: magic, version, type, payload length, payload, CRC32
    /// over everything before the CRC.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds [`Self::MAX_PAYLOAD_SIZE`].
    pub fn encode_frame(&self) -> JournalResult<Vec<u8>> {
        let payload = self.encode_payload();
        let len = u32::try_from(payload.len())
            .map_err(|_| JournalError::corrupted("record payload too large"))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&JOURNAL_MAGIC);
        buf.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        buf.push(self.record_type() as u8);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }
}

/// Outcome of decoding one frame from a buffer.
pub(crate) enum Frame {
    /// A full record and the number of bytes it consumed.
    Complete(JournalRecord, usize),
    /// The buffer ends before the frame does.
    Incomplete,
}

/// Decodes the frame at the start of `buf`.
///
/// Returns [`Frame::Incomplete`] when the buffer is a clean prefix of a
/// frame (a truncated tail), and an error when the bytes cannot be a
/// frame at all (bad magic, version, type, or CRC).
pub(crate) fn decode_frame(buf: &[u8]) -> JournalResult<Frame> {
    if buf.is_empty() {
        return Ok(Frame::Incomplete);
    }
    if buf.len() < HEADER_SIZE {
        // A partial header that matches the magic prefix is a truncated
        // tail; anything else is corruption.
        if JOURNAL_MAGIC.starts_with(&buf[..buf.len().min(4)]) {
            return Ok(Frame::Incomplete);
        }
        return Err(JournalError::corrupted("bad record magic"));
    }

    if buf[0..4] != JOURNAL_MAGIC {
        return Err(JournalError::corrupted("bad record magic"));
    }
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != JOURNAL_VERSION {
        return Err(JournalError::corrupted(format!(
            "unsupported record version {version}"
        )));
    }
    let record_type = RecordType::from_byte(buf[6])
        .ok_or_else(|| JournalError::corrupted(format!("unknown record type {}", buf[6])))?;
    let len = u32::from_le_bytes([buf[7], buf[8], buf[9], buf[10]]) as usize;

    let total = HEADER_SIZE + len + CRC_SIZE;
    if buf.len() < total {
        return Ok(Frame::Incomplete);
    }

    let body = &buf[..HEADER_SIZE + len];
    let crc_bytes = &buf[HEADER_SIZE + len..total];
    let crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc != compute_crc32(body) {
        return Err(JournalError::corrupted("record CRC mismatch"));
    }

    let record = JournalRecord::decode_payload(record_type, &buf[HEADER_SIZE..HEADER_SIZE + len])?;
    Ok(Frame::Complete(record, total))
}

/// Computes a CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
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

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc ^ 0xFFFF_FFFF
}
