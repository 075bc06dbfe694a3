use std::io::{Read, Seek, SeekFrom};

/// Byte-oriented reader over a seekable source. PNG chunk fields are
/// big-endian, so all multi-byte reads are big-endian.
#[derive(Debug)]
pub struct ByteReader<R: Read + Seek> {
    reader: R,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(reader: R) -> Self {
        ByteReader { reader }
    }

    /// Reads a big-endian 32-bit value from the stream.
    pub fn read_u32(&mut self) -> Result<u32, std::io::Error> {
        let mut bytes = [0u8; 4];
        self.reader.read_exact(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Reads exactly `n` bytes from the stream.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, std::io::Error> {
        let mut bytes = vec![0; n];
        self.reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), std::io::Error> {
        self.reader.read_exact(buf)
    }

    /// Peeks at the next `n` bytes without consuming them. The cursor is
    /// not moved.
    pub fn peek_bytes(&mut self, n: usize) -> Result<Vec<u8>, std::io::Error> {
        let mut bytes = vec![0; n];
        self.reader.read_exact(&mut bytes)?;
        self.reader.seek(SeekFrom::Current(-(n as i64)))?;

        Ok(bytes)
    }

    /// Returns the number of bytes left in the stream. The cursor is not
    /// moved.
    pub fn bytes_left(&mut self) -> Result<u64, std::io::Error> {
        let current_pos = self.reader.seek(SeekFrom::Current(0))?;
        let end_pos = self.reader.seek(SeekFrom::End(0))?;
        self.reader.seek(SeekFrom::Start(current_pos))?;

        Ok(end_pos - current_pos)
    }
}
