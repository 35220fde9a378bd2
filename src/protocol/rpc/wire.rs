//! Record Marking for RPC over TCP (RFC 5531 section 11).
//!
//! A record is sent as one or more fragments, each prefixed with a 4-byte
//! big-endian header: the low 31 bits carry the fragment length and the high
//! bit is set on the last fragment of the record.
//!
//! Reading is incremental. The transport feeds whatever bytes a non-blocking
//! read returned into [`RecordReader`] and asks for complete records, so a
//! reply split across many reads (or several replies in one read) is handled
//! without blocking.

use tracing::trace;

use crate::error::QueryError;

/// Upper bound for a reassembled record. Export lists are small; anything
/// larger is treated as a broken or hostile peer.
pub const MAX_RPC_RECORD_LENGTH: usize = 1024 * 1024;

const LAST_FRAGMENT: u32 = 1 << 31;
const HEADER_LEN: usize = 4;

/// Appends `buf` to `dest` as a record-marked record.
pub fn write_record(dest: &mut Vec<u8>, buf: &[u8]) {
    // Maximum fragment size is 2^31 - 1 bytes
    const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

    let mut offset = 0;
    loop {
        let fragment_size = std::cmp::min(buf.len() - offset, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();
        let header =
            if is_last { fragment_size as u32 | LAST_FRAGMENT } else { fragment_size as u32 };

        trace!("Writing fragment length:{}, last:{}", fragment_size, is_last);
        dest.extend_from_slice(&header.to_be_bytes());
        dest.extend_from_slice(&buf[offset..offset + fragment_size]);

        offset += fragment_size;
        if is_last {
            return;
        }
    }
}

/// Reassembles records from a byte stream delivered in arbitrary pieces.
#[derive(Debug, Default)]
pub struct RecordReader {
    /// Received bytes not yet consumed as fragments
    pending: Vec<u8>,
    /// Fragments of the record currently being assembled
    record: Vec<u8>,
}

impl RecordReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers bytes read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// True when no partial fragment or record is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.record.is_empty()
    }

    /// Returns the next complete record, or `None` if more bytes are needed.
    ///
    /// Fails with [`QueryError::Protocol`] when the record would exceed
    /// [`MAX_RPC_RECORD_LENGTH`].
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, QueryError> {
        loop {
            let Some(header) = self.pending.get(..HEADER_LEN) else {
                return Ok(None);
            };
            let header = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let is_last = header & LAST_FRAGMENT != 0;
            let length = (header & !LAST_FRAGMENT) as usize;

            if self.record.len().saturating_add(length) > MAX_RPC_RECORD_LENGTH {
                return Err(QueryError::Protocol(format!(
                    "RPC record length {} exceeds max {}",
                    self.record.len().saturating_add(length),
                    MAX_RPC_RECORD_LENGTH
                )));
            }
            if self.pending.len() < HEADER_LEN + length {
                return Ok(None);
            }

            trace!("Reading fragment length:{}, last:{}", length, is_last);
            self.record.extend_from_slice(&self.pending[HEADER_LEN..HEADER_LEN + length]);
            self.pending.drain(..HEADER_LEN + length);

            if is_last {
                return Ok(Some(std::mem::take(&mut self.record)));
            }
        }
    }
}
