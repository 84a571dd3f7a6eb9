//! File header and block envelope.
//!
//! ```text
//! +----------------+----------------+
//! | magic "ADB."   | schema id      |   8-byte header
//! +----------------+----------------+
//! | type:2|size:30 | payload ... pad to 4 |   repeated
//! +----------------+----------------------+
//! ```
//!
//! Everything is little-endian. Block iteration stops at an End block;
//! running off the end of the input without one is reported separately so
//! strict callers can insist on a terminator.

use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::error::{AdbError, Result};

/// `ADB.` read as a little-endian u32.
pub const FORMAT_MAGIC: u32 = 0x2e42_4441;

/// Size of the file header.
pub const HEADER_LEN: usize = 8;

/// Size of a block's type/size word.
pub const BLOCK_HEADER_LEN: usize = 4;

/// Blocks are padded to this alignment.
pub const BLOCK_ALIGNMENT: usize = 4;

/// Largest payload a block can declare.
pub const MAX_BLOCK_SIZE: usize = 0x3fff_ffff;

/// Round `n` up to the block alignment.
pub fn align_up(n: usize) -> usize {
    n.div_ceil(BLOCK_ALIGNMENT) * BLOCK_ALIGNMENT
}

/// File header: magic plus the schema identifier of the root object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Always [`FORMAT_MAGIC`] for a valid file.
    pub magic: u32,
    /// Identifies the schema of the root object.
    pub schema: u32,
}

impl Header {
    /// Header for a new file of the given schema.
    pub fn new(schema: u32) -> Self {
        Self {
            magic: FORMAT_MAGIC,
            schema,
        }
    }

    /// Parse and validate the magic of the first eight bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bytes: [u8; HEADER_LEN] = data
            .get(..HEADER_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(AdbError::Truncated {
                offset: 0,
                needed: HEADER_LEN as u64,
                available: data.len(),
            })?;
        Self::from_bytes(bytes)
    }

    /// Decode a header and validate its magic.
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Result<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let schema = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if magic != FORMAT_MAGIC {
            return Err(AdbError::BadMagic(magic));
        }
        Ok(Self { magic, schema })
    }

    /// Wire form of the header.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..].copy_from_slice(&self.schema.to_le_bytes());
        out
    }
}

/// The 2-bit block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// The container payload.
    Adb,
    /// A type with no assigned meaning; skipped by size.
    Unknown(u8),
    /// A detached signature over the Adb block.
    Sig,
    /// Terminator.
    End,
}

impl BlockType {
    /// Decode from the top two bits of a block word.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Adb,
            2 => Self::Sig,
            3 => Self::End,
            other => Self::Unknown(other),
        }
    }

    /// The two type bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Adb => 0,
            Self::Sig => 2,
            Self::End => 3,
            Self::Unknown(b) => u32::from(b & 0b11),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adb => f.write_str("adb"),
            Self::Sig => f.write_str("sig"),
            Self::End => f.write_str("end"),
            Self::Unknown(b) => write!(f, "unknown({b})"),
        }
    }
}

/// A decoded block word: type and payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block type.
    pub ty: BlockType,
    /// Payload length, excluding the word itself and padding.
    pub size: u32,
}

impl BlockHeader {
    /// Decode a raw little-endian block word.
    pub fn from_bytes(bytes: [u8; BLOCK_HEADER_LEN]) -> Self {
        let word = u32::from_le_bytes(bytes);
        Self {
            ty: BlockType::from_bits((word >> 30) as u8),
            size: word & MAX_BLOCK_SIZE as u32,
        }
    }

    /// Wire form of the block word.
    pub fn to_bytes(self) -> [u8; BLOCK_HEADER_LEN] {
        ((self.ty.bits() << 30) | (self.size & MAX_BLOCK_SIZE as u32)).to_le_bytes()
    }

    /// Padding bytes following the payload.
    pub fn padding(self) -> usize {
        align_up(self.size as usize) - self.size as usize
    }

    /// Total on-disk footprint including word and padding.
    pub fn total_len(self) -> usize {
        BLOCK_HEADER_LEN + align_up(self.size as usize)
    }
}

/// A block located inside an in-memory region.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    /// Type and declared size.
    pub header: BlockHeader,
    /// Offset of the block word relative to the region passed to [`Blocks`].
    pub offset: usize,
    /// Payload bytes, without padding.
    pub payload: &'a [u8],
}

/// Iterator over the blocks following the file header.
///
/// Yields `Err(Truncated)` once if a block header or payload runs past the
/// end of the region, then stops. After iteration, [`Blocks::terminated`]
/// tells whether an End block was seen.
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    data: &'a [u8],
    pos: usize,
    terminated: bool,
    done: bool,
}

impl<'a> Blocks<'a> {
    /// Start enumerating `data`, which must begin right after the header.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            terminated: false,
            done: false,
        }
    }

    /// True once an End block has been reached.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Drain the iterator, failing on truncation or a missing End block.
    pub fn check_terminated(mut self) -> Result<()> {
        for block in self.by_ref() {
            block?;
        }
        if self.terminated {
            Ok(())
        } else {
            Err(AdbError::MissingTerminator)
        }
    }

    fn step(&mut self) -> Option<Result<Block<'a>>> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return None;
        }
        let truncated = |needed: u64| AdbError::Truncated {
            offset: self.pos,
            needed,
            available: remaining,
        };
        let Some(word) = self.data.get(self.pos..self.pos + BLOCK_HEADER_LEN) else {
            return Some(Err(truncated(BLOCK_HEADER_LEN as u64)));
        };
        let header = BlockHeader::from_bytes([word[0], word[1], word[2], word[3]]);
        if header.ty == BlockType::End {
            self.terminated = true;
            return None;
        }
        let start = self.pos + BLOCK_HEADER_LEN;
        let size = header.size as usize;
        if size > self.data.len() - start {
            return Some(Err(truncated((BLOCK_HEADER_LEN + size) as u64)));
        }
        let block = Block {
            header,
            offset: self.pos,
            payload: &self.data[start..start + size],
        };
        // The final block may omit its padding.
        self.pos = (start + align_up(size)).min(self.data.len());
        debug!(ty = ?header.ty, size, offset = block.offset, "block");
        Some(Ok(block))
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Result<Block<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Write the file header.
pub fn write_header<W: Write + ?Sized>(os: &mut W, header: Header) -> Result<()> {
    os.write_all(&header.to_bytes())?;
    Ok(())
}

/// Write one block: type/size word, payload and zero padding.
pub fn write_block<W: Write + ?Sized>(os: &mut W, ty: BlockType, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_BLOCK_SIZE {
        return Err(AdbError::CapacityExceeded {
            requested: payload.len(),
            limit: MAX_BLOCK_SIZE,
        });
    }
    let header = BlockHeader {
        ty,
        size: payload.len() as u32,
    };
    os.write_all(&header.to_bytes())?;
    os.write_all(payload)?;
    let pad = header.padding();
    if pad > 0 {
        os.write_all(&[0u8; BLOCK_ALIGNMENT][..pad])?;
    }
    Ok(())
}

/// Write the End terminator.
pub fn write_end<W: Write + ?Sized>(os: &mut W) -> Result<()> {
    write_block(os, BlockType::End, &[])
}
