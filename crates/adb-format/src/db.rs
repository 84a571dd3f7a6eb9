//! Read-mode containers.
//!
//! A [`Db`] owns the bytes of a whole file, either memory-mapped or held in
//! a reference-counted buffer, and remembers where the Adb payload lives.
//! Opening with a [`Trust`] verifies the Sig blocks that follow the payload
//! and applies the trust policy before the container is handed out.

use std::fs::File;
use std::ops::Range;
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;
use tracing::debug;

use crate::block::{BLOCK_HEADER_LEN, BlockType, Blocks, HEADER_LEN, Header};
use crate::error::{AdbError, Result};
use crate::schema::AdbSchema;
use crate::trust::{SignatureReport, Trust, VerifyCtx};
use crate::val::Val;
use crate::view::{DbView, Obj};

#[derive(Debug)]
enum Backing {
    Mapped(Mmap),
    Bytes(Bytes),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => m,
            Backing::Bytes(b) => b,
        }
    }
}

/// An immutable, parsed container.
#[derive(Debug)]
pub struct Db {
    backing: Backing,
    header: Header,
    adb: Range<usize>,
    reports: Vec<SignatureReport>,
    terminated: bool,
}

impl Db {
    /// Map and parse the file at `path`.
    ///
    /// `expected` rejects files of another schema. With `trust`, signatures
    /// are verified and the trust policy must be satisfied.
    pub fn open(path: &Path, expected: Option<u32>, trust: Option<&Trust>) -> Result<Self> {
        let file = File::open(path)?;
        Self::map(&file, expected, trust)
    }

    /// Map and parse an open file. The file must not be modified while the
    /// returned container is alive.
    #[allow(unsafe_code)]
    pub fn map(file: &File, expected: Option<u32>, trust: Option<&Trust>) -> Result<Self> {
        let len = file.metadata()?.len();
        if len < HEADER_LEN as u64 {
            return Err(AdbError::Truncated {
                offset: 0,
                needed: HEADER_LEN as u64,
                available: len as usize,
            });
        }
        // SAFETY: the mapping is read-only and every access through it is
        // bounds checked. Callers guarantee the file is not truncated or
        // rewritten while mapped.
        let mmap = unsafe { Mmap::map(file)? };
        Self::parse(Backing::Mapped(mmap), expected, trust)
    }

    /// Parse an in-memory file image.
    pub fn from_bytes(
        data: impl Into<Bytes>,
        expected: Option<u32>,
        trust: Option<&Trust>,
    ) -> Result<Self> {
        Self::parse(Backing::Bytes(data.into()), expected, trust)
    }

    fn parse(backing: Backing, expected: Option<u32>, trust: Option<&Trust>) -> Result<Self> {
        let data = backing.as_slice();
        let header = Header::parse(data)?;
        if let Some(expected) = expected.filter(|&e| e != header.schema) {
            return Err(AdbError::SchemaMismatch {
                expected,
                found: header.schema,
            });
        }

        let mut blocks = Blocks::new(&data[HEADER_LEN..]);
        let mut adb: Option<Range<usize>> = None;
        let mut vfy = VerifyCtx::new();
        let mut reports = Vec::new();
        for block in blocks.by_ref() {
            let block = block?;
            match (block.header.ty, adb.clone(), trust) {
                (BlockType::Adb, None, _) => {
                    let start = HEADER_LEN + block.offset + BLOCK_HEADER_LEN;
                    adb = Some(start..start + block.payload.len());
                }
                (BlockType::Sig, Some(range), Some(trust)) => {
                    let payload = &data[range];
                    let report = trust.verify_signature(header, Some(payload), &mut vfy, block.payload);
                    reports.push(report);
                }
                (ty, _, _) => debug!(?ty, offset = block.offset, "ignoring block"),
            }
        }
        let terminated = blocks.terminated();
        let adb = adb.ok_or(AdbError::NoDataBlock)?;

        if let Some(trust) = trust {
            trust.policy().evaluate(&reports)?;
            debug!(signatures = reports.len(), "container trusted");
        }

        Ok(Self {
            backing,
            header,
            adb,
            reports,
            terminated,
        })
    }

    /// File header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Schema identifier from the header.
    pub fn schema_id(&self) -> u32 {
        self.header.schema
    }

    /// Reader over the Adb payload.
    pub fn view(&self) -> DbView<'_> {
        DbView::new(&self.backing.as_slice()[self.adb.clone()])
    }

    /// The root value.
    pub fn root(&self) -> Val {
        self.view().root()
    }

    /// The root object, typed by `schema`.
    pub fn root_object(&self, schema: &'static AdbSchema) -> Result<Obj<'_>> {
        if schema.schema_id != self.header.schema {
            return Err(AdbError::SchemaMismatch {
                expected: schema.schema_id,
                found: self.header.schema,
            });
        }
        self.view().root_object(schema.root)
    }

    /// Per-signature outcomes, in file order. Empty unless opened with trust.
    pub fn signatures(&self) -> &[SignatureReport] {
        &self.reports
    }

    /// Check every Sig block after the payload against `trust` without
    /// applying the policy.
    pub fn signature_reports(&self, trust: &Trust) -> Vec<SignatureReport> {
        let data = self.bytes();
        let payload = &data[self.adb.clone()];
        let mut vfy = VerifyCtx::new();
        Blocks::new(&data[HEADER_LEN..])
            .map_while(|block| block.ok())
            .filter(|block| {
                block.header.ty == BlockType::Sig && HEADER_LEN + block.offset > self.adb.start
            })
            .map(|block| trust.verify_signature(self.header, Some(payload), &mut vfy, block.payload))
            .collect()
    }

    /// The complete file image.
    pub fn bytes(&self) -> &[u8] {
        self.backing.as_slice()
    }

    /// Byte range of the Adb payload within [`Db::bytes`].
    pub fn adb_range(&self) -> Range<usize> {
        self.adb.clone()
    }

    /// True if the block sequence ended with an End block.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// True if the container is backed by a file mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }
}
