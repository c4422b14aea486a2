//! XDR codec bound to a datagram transport.
//!
//! A datagram carries exactly one record, so there is no framing and no
//! carry-over between records: `begin_*` starts a record, `end_*` finishes
//! it, and the buffers are reused by the next call.

use std::io::{self, Read, Write};

use super::buffer::{DecodeBuffer, EncodeBuffer};

/// Smallest buffer a datagram codec will work with.
pub const MIN_BUFFER_SIZE: usize = 1024;
/// Buffer size used when the caller does not pick one.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Encodes one outgoing datagram at a time into a fixed buffer.
#[derive(Debug)]
pub struct DatagramEncoder {
    buffer: EncodeBuffer,
}

impl DatagramEncoder {
    /// `size` is raised to [`MIN_BUFFER_SIZE`] if smaller.
    pub fn new(size: usize) -> Self {
        Self { buffer: EncodeBuffer::with_capacity(size.max(MIN_BUFFER_SIZE)) }
    }

    pub fn begin_encoding(&mut self) {
        self.buffer.reset();
    }

    /// Finishes the record and returns the bytes to put on the wire.
    pub fn end_encoding(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn position(&self) -> usize {
        self.buffer.position()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl Write for DatagramEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Decodes one received datagram at a time.
#[derive(Debug)]
pub struct DatagramDecoder {
    buffer: DecodeBuffer,
}

impl DatagramDecoder {
    /// `size` is raised to [`MIN_BUFFER_SIZE`] if smaller.
    pub fn new(size: usize) -> Self {
        Self { buffer: DecodeBuffer::with_capacity(size.max(MIN_BUFFER_SIZE)) }
    }

    /// Storage for the transport to receive the next datagram into.
    pub fn receive_buffer(&mut self) -> &mut [u8] {
        self.buffer.storage_mut()
    }

    /// Exposes the `len` bytes just received as the current record.
    pub fn begin_decoding(&mut self, len: usize) {
        self.buffer.load(len);
    }

    /// Discards whatever is left of the current record.
    pub fn end_decoding(&mut self) {
        self.buffer.clear();
    }

    /// First word of the current record, normally the xid.
    pub fn peek_u32(&self) -> Option<u32> {
        self.buffer.peek_u32()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }
}

impl Read for DatagramDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}
