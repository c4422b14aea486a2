//! XDR codec bound to a stream transport, using the RFC 1831 Record Marking
//! Standard (section 10).
//!
//! A stream has no message boundaries, so every record is sent as one or
//! more fragments. Each fragment starts with a 4-byte big endian header: the
//! lower 31 bits hold the fragment length and the highest bit is set on the
//! last fragment of a record.
//!
//! The encoder builds fragments in memory. Finished records are queued until
//! the caller asks for a flush, at which point the whole queue is handed to
//! the transport in one write. This is what makes batching of one-way calls
//! possible. The decoder reads fragments until the last one and exposes the
//! reassembled record as a single [`DecodeBuffer`].

use std::io::{self, Write};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::buffer::DecodeBuffer;
use super::datagram::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};

/// Highest bit of a fragment header, set on the last fragment of a record.
pub const LAST_FRAGMENT: u32 = 1 << 31;
/// Maximum fragment size is 2^31 - 1 bytes.
pub const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;
/// Largest reassembled record the decoder accepts.
pub const MAX_RPC_RECORD_LENGTH: usize = 8 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Splits a fragment header into `(length, is_last)`.
pub fn parse_fragment_header(header: u32) -> (usize, bool) {
    ((header & !LAST_FRAGMENT) as usize, header & LAST_FRAGMENT != 0)
}

/// Builds a fragment header.
pub fn fragment_header(length: usize, is_last: bool) -> u32 {
    let length = length as u32 & !LAST_FRAGMENT;
    if is_last {
        length | LAST_FRAGMENT
    } else {
        length
    }
}

/// Encodes records as record-marked fragments, optionally batching several
/// records before they are written out.
#[derive(Debug)]
pub struct RecordEncoder {
    /// Bytes ready for the transport: complete fragments plus the open one.
    pending: Vec<u8>,
    /// Offset of the header of the fragment currently being filled.
    fragment_start: usize,
    /// Largest payload of a single fragment.
    fragment_size: usize,
    /// Queued bytes after which a batch is flushed regardless.
    batch_limit: usize,
    in_record: bool,
}

impl RecordEncoder {
    /// `buffer_size` bounds both the fragment payload and the batch queue.
    /// It is raised to the datagram minimum and rounded up to a multiple of 4.
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        let buffer_size = (buffer_size + 3) & !3;
        Self {
            pending: Vec::with_capacity(buffer_size),
            fragment_start: 0,
            fragment_size: buffer_size.min(MAX_FRAGMENT_SIZE) - HEADER_LEN,
            batch_limit: buffer_size,
            in_record: false,
        }
    }

    /// Opens a new record behind whatever is already queued.
    pub fn begin_encoding(&mut self) {
        self.open_fragment();
        self.in_record = true;
    }

    /// Closes the current record.
    ///
    /// Returns `true` when the queue has to be written now: either the
    /// caller asked for a flush or the batch reached its limit.
    pub fn end_encoding(&mut self, flush: bool) -> bool {
        self.close_fragment(true);
        self.in_record = false;
        flush || self.pending.len() >= self.batch_limit
    }

    /// Drops a half-encoded record, keeping earlier queued records.
    pub fn abort_encoding(&mut self) {
        if self.in_record {
            self.pending.truncate(self.fragment_start);
            self.in_record = false;
        }
    }

    /// Bytes queued for the transport.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Marks the queue as written.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.fragment_start = 0;
        self.in_record = false;
    }

    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    fn open_fragment(&mut self) {
        self.fragment_start = self.pending.len();
        self.pending.extend_from_slice(&[0; HEADER_LEN]);
    }

    fn close_fragment(&mut self, is_last: bool) {
        let length = self.pending.len() - self.fragment_start - HEADER_LEN;
        let header = fragment_header(length, is_last).to_be_bytes();
        self.pending[self.fragment_start..self.fragment_start + HEADER_LEN].copy_from_slice(&header);
        trace!("Closing fragment length:{}, last:{}", length, is_last);
    }

    fn open_room(&self) -> usize {
        self.fragment_size - (self.pending.len() - self.fragment_start - HEADER_LEN)
    }
}

impl Write for RecordEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.in_record {
            return Err(io::Error::other("record encoder written outside of a record"));
        }
        let mut rest = buf;
        while !rest.is_empty() {
            if self.open_room() == 0 {
                self.close_fragment(false);
                self.open_fragment();
            }
            let n = self.open_room().min(rest.len());
            self.pending.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for RecordEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Reads a single record-marked fragment from a stream
///
/// Appends the fragment payload to `append_to` and returns whether it was
/// the last fragment of the record. The accumulated record may not grow past
/// [`MAX_RPC_RECORD_LENGTH`].
pub async fn read_fragment<S>(socket: &mut S, append_to: &mut Vec<u8>) -> io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    let mut header_buf = [0_u8; HEADER_LEN];
    socket.read_exact(&mut header_buf).await?;
    let (length, is_last) = parse_fragment_header(u32::from_be_bytes(header_buf));
    trace!("Reading fragment length:{}, last:{}", length, is_last);
    if append_to.len().saturating_add(length) > MAX_RPC_RECORD_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("RPC record length {} exceeds max {}", length, MAX_RPC_RECORD_LENGTH),
        ));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Reassembles incoming records from a stream.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: DecodeBuffer,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads fragments until the end of the next record and exposes it for
    /// decoding. Anything left of the previous record is discarded.
    pub async fn begin_decoding<S>(&mut self, socket: &mut S) -> io::Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let mut record = Vec::new();
        while !read_fragment(socket, &mut record).await? {}
        trace!("Reassembled record length:{}", record.len());
        self.buffer.load_record(record);
        Ok(())
    }

    pub fn end_decoding(&mut self) {
        self.buffer.clear();
    }

    pub fn peek_u32(&self) -> Option<u32> {
        self.buffer.peek_u32()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }
}

impl io::Read for RecordDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}
