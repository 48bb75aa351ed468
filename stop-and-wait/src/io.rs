//! Payload source and sink collaborators.
//!
//! Endpoint A pulls bytes from a [`ByteSource`]; Endpoint B pushes delivered
//! payload into a [`ByteSink`].  Both are blanket-implemented for the standard
//! I/O traits, so files, `Cursor`s and `Vec<u8>` work directly.

use std::io::{self, Read, Write};

/// Pull side of the transfer.
pub trait ByteSource {
    /// Read up to `max` bytes.
    ///
    /// Returns fewer than `max` bytes only at end of stream; an empty vector
    /// means the stream is exhausted.
    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>>;
}

impl<R: Read> ByteSource for R {
    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(max);
        self.by_ref().take(max as u64).read_to_end(&mut chunk)?;
        Ok(chunk)
    }
}

/// Push side of the transfer.
pub trait ByteSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<W: Write> ByteSink for W {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}
