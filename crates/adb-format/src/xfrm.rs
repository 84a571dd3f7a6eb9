//! Block-level rewriting of existing containers.
//!
//! [`Transform`] copies a container from a reader to a writer one block at a
//! time. A [`BlockFilter`] decides per block whether it is forwarded
//! unchanged, dropped, or read into memory and handed to the filter, which
//! may then emit any number of replacement blocks. Forwarded blocks are
//! streamed and never decoded.
//!
//! The first Adb block written to the output is hashed on the way through
//! so a filter can sign the result without buffering it.

use std::io::{self, Read, Write};

use sha2::{Digest, Sha512};
use tracing::debug;

use crate::block::{
    BLOCK_ALIGNMENT, BLOCK_HEADER_LEN, BlockHeader, BlockType, HEADER_LEN, Header, align_up,
    write_block, write_end, write_header,
};
use crate::error::{AdbError, Result};
use crate::trust::{HashAlg, Trust, VerifyCtx};

const CHUNK: usize = 64 * 1024;

/// What to do with one input block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Copy it to the output byte for byte.
    Forward,
    /// Skip it.
    Drop,
    /// Read it and pass it to [`BlockFilter::rewrite`].
    Intercept,
}

/// Per-block policy for a [`Transform`].
///
/// Every method has a pass-through default.
pub trait BlockFilter<W: Write> {
    /// Inspect or replace the file header before it is written.
    fn header(&mut self, _header: &mut Header) -> Result<()> {
        Ok(())
    }

    /// Decide the fate of the next block. Called exactly once per block, End
    /// included, in file order.
    fn classify(&mut self, _block: BlockHeader) -> Disposition {
        Disposition::Forward
    }

    /// Handle an intercepted block.
    fn rewrite(
        &mut self,
        out: &mut XfrmOutput<W>,
        block: BlockHeader,
        payload: Vec<u8>,
    ) -> Result<()> {
        if block.ty == BlockType::End {
            out.write_end()
        } else {
            out.write_block(block.ty, &payload)
        }
    }

    /// Called once the input is exhausted, before the output is terminated.
    fn finish(&mut self, _out: &mut XfrmOutput<W>) -> Result<()> {
        Ok(())
    }
}

/// The output side of a transform.
#[derive(Debug)]
pub struct XfrmOutput<W> {
    os: W,
    header: Header,
    vfy: VerifyCtx,
    adb_seen: bool,
    ended: bool,
}

impl<W: Write> XfrmOutput<W> {
    fn new(os: W) -> Self {
        Self {
            os,
            header: Header::new(0),
            vfy: VerifyCtx::new(),
            adb_seen: false,
            ended: false,
        }
    }

    /// Header written to the output.
    pub fn header(&self) -> Header {
        self.header
    }

    /// True once an Adb block has been written.
    pub fn adb_seen(&self) -> bool {
        self.adb_seen
    }

    /// True once the End block has been written.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Write a complete block.
    pub fn write_block(&mut self, ty: BlockType, payload: &[u8]) -> Result<()> {
        match ty {
            BlockType::End => return self.write_end(),
            BlockType::Adb if !self.adb_seen => {
                self.vfy.store(HashAlg::Sha512, &Sha512::digest(payload))?;
                self.adb_seen = true;
            }
            _ => {}
        }
        write_block(&mut self.os, ty, payload)
    }

    /// Write the End block.
    pub fn write_end(&mut self) -> Result<()> {
        if !self.ended {
            write_end(&mut self.os)?;
            self.ended = true;
        }
        Ok(())
    }

    /// Sign the first Adb block written so far with every private key in
    /// `trust`. Returns the number of Sig blocks written.
    pub fn sign(&mut self, trust: &Trust) -> Result<usize> {
        if !self.adb_seen {
            return Err(AdbError::NoDataBlock);
        }
        trust.write_signatures(&mut self.os, self.header, None, &mut self.vfy)
    }

    fn forward<R: Read>(&mut self, is: &mut R, block: BlockHeader, offset: usize) -> Result<()> {
        let size = block.size as usize;
        let mut hasher = (block.ty == BlockType::Adb && !self.adb_seen).then(Sha512::new);
        self.os.write_all(&block.to_bytes())?;

        let mut buf = vec![0u8; CHUNK.min(size.max(1))];
        let mut left = size;
        while left > 0 {
            let want = left.min(buf.len());
            let got = read_full(is, &mut buf[..want])?;
            if got < want {
                return Err(truncated(offset, block, size - left + got));
            }
            if let Some(h) = hasher.as_mut() {
                h.update(&buf[..got]);
            }
            self.os.write_all(&buf[..got])?;
            left -= got;
        }
        let pad = read_padding(is, block)?;
        self.os.write_all(&pad[..block.padding()])?;

        if let Some(h) = hasher {
            self.vfy.store(HashAlg::Sha512, &h.finalize())?;
            self.adb_seen = true;
        }
        Ok(())
    }

    /// Borrow the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.os
    }
}

fn truncated(offset: usize, block: BlockHeader, got: usize) -> AdbError {
    AdbError::Truncated {
        offset,
        needed: (BLOCK_HEADER_LEN + block.size as usize) as u64,
        available: BLOCK_HEADER_LEN + got,
    }
}

/// Read until `buf` is full or the input ends.
fn read_full<R: Read>(is: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match is.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Consume the padding after a payload and return it. The last block of a
/// file may omit it; missing bytes read as zero.
fn read_padding<R: Read>(is: &mut R, block: BlockHeader) -> Result<[u8; BLOCK_ALIGNMENT]> {
    let mut pad = [0u8; BLOCK_ALIGNMENT];
    read_full(is, &mut pad[..block.padding()])?;
    Ok(pad)
}

/// A block-by-block copy from `R` to `W`.
#[derive(Debug)]
pub struct Transform<R, W> {
    is: R,
    out: XfrmOutput<W>,
}

impl<R: Read, W: Write> Transform<R, W> {
    /// Copy from `is` to `os`.
    pub fn new(is: R, os: W) -> Self {
        Self {
            is,
            out: XfrmOutput::new(os),
        }
    }

    /// Run the copy through `filter` and return the writer.
    ///
    /// The output always ends with an End block, even if the input did not.
    pub fn run<F: BlockFilter<W> + ?Sized>(mut self, filter: &mut F) -> Result<W> {
        let mut raw = [0u8; HEADER_LEN];
        let got = read_full(&mut self.is, &mut raw)?;
        if got < HEADER_LEN {
            return Err(AdbError::Truncated {
                offset: 0,
                needed: HEADER_LEN as u64,
                available: got,
            });
        }
        let mut header = Header::from_bytes(raw)?;
        filter.header(&mut header)?;
        self.out.header = header;
        write_header(&mut self.out.os, header)?;

        let mut offset = HEADER_LEN;
        let mut blocks = 0usize;
        loop {
            let mut word = [0u8; BLOCK_HEADER_LEN];
            let got = read_full(&mut self.is, &mut word)?;
            if got == 0 {
                debug!(offset, "input ended without terminator");
                break;
            }
            if got < BLOCK_HEADER_LEN {
                return Err(AdbError::Truncated {
                    offset,
                    needed: BLOCK_HEADER_LEN as u64,
                    available: got,
                });
            }
            let block = BlockHeader::from_bytes(word);
            let disposition = filter.classify(block);
            debug!(ty = ?block.ty, size = block.size, ?disposition, "xfrm block");
            blocks += 1;

            if block.ty == BlockType::End {
                match disposition {
                    Disposition::Forward => self.out.write_end()?,
                    Disposition::Drop => {}
                    Disposition::Intercept => filter.rewrite(&mut self.out, block, Vec::new())?,
                }
                break;
            }

            match disposition {
                Disposition::Forward => self.out.forward(&mut self.is, block, offset)?,
                Disposition::Drop => {
                    let want = align_up(block.size as usize) as u64;
                    let skipped = io::copy(&mut (&mut self.is).take(want), &mut io::sink())?;
                    if skipped < u64::from(block.size) {
                        return Err(truncated(offset, block, skipped as usize));
                    }
                }
                Disposition::Intercept => {
                    let mut payload = vec![0u8; block.size as usize];
                    let got = read_full(&mut self.is, &mut payload)?;
                    if got < payload.len() {
                        return Err(truncated(offset, block, got));
                    }
                    read_padding(&mut self.is, block)?;
                    filter.rewrite(&mut self.out, block, payload)?;
                }
            }
            offset += block.total_len();
        }

        filter.finish(&mut self.out)?;
        self.out.write_end()?;
        self.out.os.flush()?;
        debug!(blocks, "transform complete");
        Ok(self.out.os)
    }
}

/// Replace all signatures with fresh ones from a trust store.
///
/// Existing Sig blocks are dropped; new ones are written right before the
/// End block.
#[derive(Debug)]
pub struct Resign<'t> {
    trust: &'t Trust,
    signed: usize,
    done: bool,
}

impl<'t> Resign<'t> {
    /// Sign with every private key in `trust`.
    pub fn new(trust: &'t Trust) -> Self {
        Self {
            trust,
            signed: 0,
            done: false,
        }
    }

    /// Signatures written so far.
    pub fn signed(&self) -> usize {
        self.signed
    }

    fn sign<W: Write>(&mut self, out: &mut XfrmOutput<W>) -> Result<()> {
        if !self.done {
            self.signed = out.sign(self.trust)?;
            self.done = true;
        }
        Ok(())
    }
}

impl<W: Write> BlockFilter<W> for Resign<'_> {
    fn classify(&mut self, block: BlockHeader) -> Disposition {
        match block.ty {
            BlockType::Sig => Disposition::Drop,
            BlockType::End => Disposition::Intercept,
            BlockType::Adb | BlockType::Unknown(_) => Disposition::Forward,
        }
    }

    fn rewrite(
        &mut self,
        out: &mut XfrmOutput<W>,
        block: BlockHeader,
        payload: Vec<u8>,
    ) -> Result<()> {
        if block.ty == BlockType::End {
            self.sign(out)?;
            return out.write_end();
        }
        out.write_block(block.ty, &payload)
    }

    fn finish(&mut self, out: &mut XfrmOutput<W>) -> Result<()> {
        self.sign(out)
    }
}

/// Drop every Sig block.
#[derive(Debug, Default)]
pub struct StripSignatures {
    removed: usize,
}

impl StripSignatures {
    /// New filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sig blocks dropped so far.
    pub fn removed(&self) -> usize {
        self.removed
    }
}

impl<W: Write> BlockFilter<W> for StripSignatures {
    fn classify(&mut self, block: BlockHeader) -> Disposition {
        if block.ty == BlockType::Sig {
            self.removed += 1;
            Disposition::Drop
        } else {
            Disposition::Forward
        }
    }
}
