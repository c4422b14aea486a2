//! Bounded byte regions the transport codecs encode into and decode from.
//!
//! [`EncodeBuffer`] has a fixed capacity: writing past it fails with
//! [`XdrError::BufferOverflow`] instead of growing. [`DecodeBuffer`] tracks
//! a high-water mark, the end of the record currently held. Reading past it
//! fails with [`XdrError::BufferUnderflow`], so a lying length prefix can
//! never pull in bytes that belong to something else.
//!
//! Both errors travel inside [`std::io::Error`] because the XDR traits are
//! built on `Read`/`Write`; [`XdrError::from_io`] recovers them.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Buffer bound violations raised by the XDR codecs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum XdrError {
    #[error("XDR buffer overflow")]
    BufferOverflow,
    #[error("XDR buffer underflow")]
    BufferUnderflow,
}

impl XdrError {
    /// Extracts the codec error carried by an I/O error, if any.
    ///
    /// A plain `UnexpectedEof` from a foreign reader counts as an underflow
    /// too: the record ended before the value did.
    pub fn from_io(err: &io::Error) -> Option<XdrError> {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<XdrError>()) {
            return Some(*inner);
        }
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Some(XdrError::BufferUnderflow),
            _ => None,
        }
    }
}

impl From<XdrError> for io::Error {
    fn from(err: XdrError) -> io::Error {
        let kind = match err {
            XdrError::BufferOverflow => io::ErrorKind::WriteZero,
            XdrError::BufferUnderflow => io::ErrorKind::UnexpectedEof,
        };
        io::Error::new(kind, err)
    }
}

/// Fixed-capacity encode target.
#[derive(Debug)]
pub struct EncodeBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl EncodeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), capacity }
    }

    /// Drops everything encoded so far.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Current cursor, i.e. the number of bytes encoded.
    pub fn position(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Write for EncodeBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.data.len() + buf.len() > self.capacity {
            return Err(XdrError::BufferOverflow.into());
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Decode source holding at most one record.
#[derive(Debug, Default)]
pub struct DecodeBuffer {
    data: Vec<u8>,
    position: usize,
    high_water: usize,
}

impl DecodeBuffer {
    /// Creates a buffer able to receive records of up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity], position: 0, high_water: 0 }
    }

    /// Wraps an already received record.
    pub fn from_record(record: Vec<u8>) -> Self {
        let high_water = record.len();
        Self { data: record, position: 0, high_water }
    }

    /// The whole backing storage, for a transport to receive into.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Marks the first `len` bytes of storage as the current record and
    /// rewinds the cursor to its start.
    pub fn load(&mut self, len: usize) {
        self.high_water = len.min(self.data.len());
        self.position = 0;
    }

    /// Replaces the storage with `record` and rewinds.
    pub fn load_record(&mut self, record: Vec<u8>) {
        self.high_water = record.len();
        self.data = record;
        self.position = 0;
    }

    /// Forgets the current record.
    pub fn clear(&mut self) {
        self.position = 0;
        self.high_water = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Bytes of the current record not yet decoded.
    pub fn remaining(&self) -> usize {
        self.high_water - self.position
    }

    /// Reads the first word of the record without moving the cursor.
    ///
    /// For RPC messages this is the xid, which is enough to decide whether a
    /// record belongs to the pending call at all.
    pub fn peek_u32(&self) -> Option<u32> {
        let word = self.data.get(self.position..self.position + 4)?;
        if self.position + 4 > self.high_water {
            return None;
        }
        Some(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
    }
}

/// The high-water mark reads as end of file. `read_exact` turns a short
/// record into `UnexpectedEof`, which [`XdrError::from_io`] reports as an
/// underflow.
impl Read for DecodeBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining().min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}
