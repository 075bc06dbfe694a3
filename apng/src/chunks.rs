use std::io::{Read, Seek, SeekFrom};

use crate::log_warn;
use crate::utils::error::{ApngError, ApngResult};
use crate::utils::reader::ByteReader;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

// Chunk lengths have the top bit clear per the PNG chunk grammar
const MAX_CHUNK_LENGTH: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkType {
    // Critical chunks
    Ihdr,
    Plte,
    Idat,
    Iend,

    // Transparency
    Trns,

    // Animation chunks
    Actl,
    Fctl,
    Fdat,

    // Ancillary chunks surfaced in the stream info
    Gama,
    Phys,
    Time,
    Text,

    // Everything else is skipped
    Other([u8; 4]),
}

fn get_chunk_type(name: &[u8; 4]) -> ChunkType {
    match name {
        b"IHDR" => ChunkType::Ihdr,
        b"PLTE" => ChunkType::Plte,
        b"IDAT" => ChunkType::Idat,
        b"IEND" => ChunkType::Iend,
        b"tRNS" => ChunkType::Trns,
        b"acTL" => ChunkType::Actl,
        b"fcTL" => ChunkType::Fctl,
        b"fdAT" => ChunkType::Fdat,
        b"gAMA" => ChunkType::Gama,
        b"pHYs" => ChunkType::Phys,
        b"tIME" => ChunkType::Time,
        b"tEXt" => ChunkType::Text,
        _ => ChunkType::Other(*name),
    }
}

/// A single well-formed chunk: its recognized type and data bytes. The CRC
/// has already been validated when one of these exists.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub chunk_type: ChunkType,
    pub data: Vec<u8>,
}

pub(crate) struct CrcCalculator {
    table: [u32; 256],
}

impl CrcCalculator {
    pub(crate) fn new() -> Self {
        let mut table = [0u32; 256];
        for n in 0..256 {
            let mut c = n as u32;
            for _ in 0..8 {
                if c & 1 == 1 {
                    c = 0xedb88320u32 ^ (c >> 1);
                } else {
                    c = c >> 1;
                }
            }
            table[n] = c;
        }
        Self { table }
    }

    fn update_crc(&self, crc: u32, buf: &[u8]) -> u32 {
        let mut c = crc;
        for &b in buf {
            c = self.table[((c ^ u32::from(b)) & 0xff) as usize] ^ (c >> 8);
        }
        c
    }

    pub(crate) fn calculate_crc(&self, data: &[u8]) -> u32 {
        self.update_crc(0xffffffff, data) ^ 0xffffffff
    }
}

/// Returns whether the next eight bytes of `source` are the PNG signature.
/// The read position is left unchanged.
pub fn recognize<R: Read + Seek>(source: &mut R) -> bool {
    let start = match source.seek(SeekFrom::Current(0)) {
        Ok(pos) => pos,
        Err(_) => return false,
    };

    let mut signature = [0u8; 8];
    let matches = source.read_exact(&mut signature).is_ok() && signature == PNG_SIGNATURE;

    if source.seek(SeekFrom::Start(start)).is_err() {
        return false;
    }

    matches
}

/// Partitions a PNG byte stream into signature plus chunks, validating the
/// CRC of every chunk it hands out.
pub struct ChunkReader<R: Read + Seek> {
    reader: ByteReader<R>,
    crc: CrcCalculator,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn new(source: R) -> Self {
        ChunkReader {
            reader: ByteReader::new(source),
            crc: CrcCalculator::new(),
        }
    }

    /// Whether the stream starts with the PNG signature at the current
    /// position. Does not move the cursor.
    pub fn recognize(&mut self) -> ApngResult<bool> {
        if self.reader.bytes_left()? < PNG_SIGNATURE.len() as u64 {
            return Ok(false);
        }

        let signature = self.reader.peek_bytes(PNG_SIGNATURE.len())?;

        Ok(signature == PNG_SIGNATURE)
    }

    /// Consumes the eight signature bytes, or fails with `NotPng` without
    /// consuming anything.
    pub fn consume_signature(&mut self) -> ApngResult<()> {
        if !self.recognize()? {
            return Err(ApngError::NotPng);
        }

        self.reader.read_bytes(PNG_SIGNATURE.len())?;

        Ok(())
    }

    /// Reads the next chunk. Returns `None` at a clean end of stream; any
    /// framing damage (truncation, oversized length, CRC mismatch) is
    /// `Malformed`.
    pub fn next_chunk(&mut self) -> ApngResult<Option<RawChunk>> {
        let remaining = self.reader.bytes_left()?;

        if remaining == 0 {
            return Ok(None);
        }

        if remaining < 12 {
            return Err(ApngError::Malformed(format!(
                "{} trailing bytes are too short for a chunk",
                remaining
            )));
        }

        let length = self.reader.read_u32()?;

        if length > MAX_CHUNK_LENGTH {
            return Err(ApngError::Malformed(format!(
                "chunk length 0x{:08x} exceeds the chunk grammar limit",
                length
            )));
        }

        if length as u64 + 8 > remaining - 4 {
            return Err(ApngError::Malformed(format!(
                "chunk of {} bytes truncated ({} bytes left in stream)",
                length,
                remaining - 4
            )));
        }

        let mut name = [0u8; 4];
        self.reader.read_exact(&mut name)?;

        let data = self.reader.read_bytes(length as usize)?;
        let expected_crc = self.reader.read_u32()?;

        let mut crc_data = Vec::with_capacity(4 + data.len());
        crc_data.extend_from_slice(&name);
        crc_data.extend_from_slice(&data);

        let calculated_crc = self.crc.calculate_crc(&crc_data);

        if calculated_crc != expected_crc {
            log_warn!(
                "CRC mismatch for chunk {:?}: expected 0x{:08x}, calculated 0x{:08x}",
                String::from_utf8_lossy(&name),
                expected_crc,
                calculated_crc
            );

            return Err(ApngError::Malformed(format!(
                "CRC mismatch for chunk {:?}",
                String::from_utf8_lossy(&name)
            )));
        }

        Ok(Some(RawChunk {
            chunk_type: get_chunk_type(&name),
            data,
        }))
    }
}
