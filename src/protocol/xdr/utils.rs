use std::io::{self, Read, Write};

/// Every XDR item occupies a multiple of this many bytes.
pub const ALIGNMENT: usize = 4;

const ZEROS: [u8; ALIGNMENT] = [0; ALIGNMENT];

/// Zero bytes that follow `len` bytes of data.
pub fn padding_len(len: usize) -> usize {
    (ALIGNMENT - len % ALIGNMENT) % ALIGNMENT
}

/// Skips the padding after `len` bytes of data. Its content is not checked.
pub(super) fn read_padding(len: usize, src: &mut impl Read) -> io::Result<()> {
    let mut skipped = ZEROS;
    src.read_exact(&mut skipped[..padding_len(len)])
}

pub(super) fn write_padding(len: usize, dest: &mut impl Write) -> io::Result<()> {
    dest.write_all(&ZEROS[..padding_len(len)])
}

pub fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
