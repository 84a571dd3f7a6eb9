//! Write path.
//!
//! A [`Builder`] owns a growable data region. Scalars, objects and arrays are
//! appended to it and referenced by the returned [`Val`]s. Byte runs are
//! interned through a hash-bucket table so identical content written twice
//! shares one offset.
//!
//! Objects and arrays are assembled in an [`ObjWriter`] and committed with
//! [`Builder::write_obj`]. The root is set last with [`Builder::set_root`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::trace;

use crate::block::Header;
use crate::dedup::{DedupStats, DedupTable};
use crate::error::{AdbError, Result};
use crate::schema::{Kind, ObjSchema};
use crate::trust::Trust;
use crate::val::{FIRST, NUM_ENTRIES, VALUE_MASK, Val, ValType, blob_prefix};
use crate::view::{DbView, MAX_DEPTH, compare_values};

/// Bucket count used by [`Builder::new`].
pub const DEFAULT_BUCKETS: usize = 1000;

/// Bucket count for limited scratch builders.
const SCRATCH_BUCKETS: usize = 16;

/// Append-only, deduplicating writer for one container.
#[derive(Debug, Clone)]
pub struct Builder {
    header: Header,
    buf: Vec<u8>,
    dedup: DedupTable,
    limit: Option<usize>,
    root: Option<Val>,
}

impl Builder {
    /// Builder for a container of `schema` with the default table size.
    pub fn new(schema: u32) -> Self {
        Self::with_buckets(schema, DEFAULT_BUCKETS)
    }

    /// Builder with `num_buckets` dedup buckets. Larger tables suit big,
    /// long-lived builders.
    pub fn with_buckets(schema: u32, num_buckets: usize) -> Self {
        Self {
            header: Header::new(schema),
            buf: Vec::new(),
            dedup: DedupTable::new(num_buckets),
            limit: None,
            root: None,
        }
    }

    /// Scratch builder whose data region may not grow past `limit` bytes.
    ///
    /// Writes that would exceed the limit fail with
    /// [`AdbError::CapacityExceeded`] and leave the region untouched.
    pub fn with_limit(schema: u32, limit: usize) -> Self {
        Self {
            header: Header::new(schema),
            buf: Vec::with_capacity(limit),
            dedup: DedupTable::new(SCRATCH_BUCKETS),
            limit: Some(limit),
            root: None,
        }
    }

    /// Header the container will be written with.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Schema identifier of the container.
    pub fn schema(&self) -> u32 {
        self.header.schema
    }

    /// Read access to everything written so far.
    pub fn view(&self) -> DbView<'_> {
        DbView::new(&self.buf)
    }

    /// The data region as it will appear in the Adb block.
    pub fn payload(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True before anything has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Root value, if set and nothing was appended after it.
    pub fn root(&self) -> Option<Val> {
        self.root
    }

    /// Dedup table counters.
    pub fn stats(&self) -> DedupStats {
        self.dedup.stats()
    }

    /// Discard all written data, keeping the schema and limits.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.dedup.clear();
        self.root = None;
    }

    fn write_raw(&mut self, parts: &[&[u8]], align: usize) -> Result<u32> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let start = self.buf.len().next_multiple_of(align.max(1));
        let end = start + len;
        if let Some(limit) = self.limit.filter(|&limit| end > limit) {
            return Err(AdbError::CapacityExceeded {
                requested: end,
                limit,
            });
        }
        if start > VALUE_MASK as usize {
            return Err(AdbError::CapacityExceeded {
                requested: end,
                limit: VALUE_MASK as usize,
            });
        }
        self.buf.resize(start, 0);
        for part in parts {
            self.buf.extend_from_slice(part);
        }
        self.root = None;
        Ok(start as u32)
    }

    fn write_data(&mut self, parts: &[&[u8]], align: usize) -> Result<u32> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let hash = DedupTable::hash(parts);
        let buf = &self.buf;
        if let Some(offset) = self
            .dedup
            .find(hash, len as u32, align, |at| same_bytes(buf, at, parts))
        {
            trace!(offset, len, "dedup hit");
            return Ok(offset);
        }
        let offset = self.write_raw(parts, align)?;
        self.dedup.insert(hash, offset, len as u32);
        Ok(offset)
    }

    /// Write an integer in the narrowest encoding that holds it.
    pub fn write_int(&mut self, n: u64) -> Result<Val> {
        if let Some(v) = Val::inline_int(n) {
            return Ok(v);
        }
        match u32::try_from(n) {
            Ok(n) => {
                let at = self.write_data(&[&n.to_le_bytes()], 4)?;
                Ok(Val::new(ValType::Int32, at))
            }
            Err(_) => {
                let at = self.write_data(&[&n.to_le_bytes()], 8)?;
                Ok(Val::new(ValType::Int64, at))
            }
        }
    }

    /// Write a byte string. Empty input is stored as Null.
    pub fn write_blob(&mut self, data: &[u8]) -> Result<Val> {
        if data.is_empty() {
            return Ok(Val::NULL);
        }
        let (ty, prefix) = blob_prefix(data.len());
        let at = self.write_data(&[&prefix, data], prefix.len())?;
        Ok(Val::new(ty, at))
    }

    fn write_blob32(&mut self, data: &[u8]) -> Result<Val> {
        let len = u32::try_from(data.len()).map_err(|_| AdbError::CapacityExceeded {
            requested: data.len(),
            limit: u32::MAX as usize,
        })?;
        let at = self.write_data(&[&len.to_le_bytes(), data], 4)?;
        Ok(Val::new(ValType::Blob32, at))
    }

    /// Embed another finished builder as a nested container.
    ///
    /// Only the payload is stored; the nested schema id is not recorded.
    pub fn write_adb(&mut self, nested: &Builder) -> Result<Val> {
        if nested.root.is_none() {
            return Err(AdbError::MissingRoot);
        }
        self.write_blob32(nested.payload())
    }

    /// Commit an object or array and reset the writer.
    ///
    /// The schema's pre-commit hook runs first. Trailing Null slots are
    /// dropped; an object with nothing set is written as Null.
    pub fn write_obj(&mut self, w: &mut ObjWriter) -> Result<Val> {
        let hook = match w.schema {
            ObjSchema::Object(schema) => schema.pre_commit,
            ObjSchema::Array(_) => None,
        };
        if let Some(hook) = hook {
            hook(w, self)?;
        }
        let mut num = w.slots.len();
        while num > FIRST && w.slots[num - 1].is_null() {
            num -= 1;
        }
        if num <= FIRST {
            w.reset();
            return Ok(Val::NULL);
        }
        let mut bytes = Vec::with_capacity(num * 4);
        bytes.extend_from_slice(&(num as u32).to_le_bytes());
        for v in &w.slots[FIRST..num] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let at = self.write_data(&[&bytes], 4)?;
        w.reset();
        Ok(Val::new(w.schema.val_type(), at))
    }

    /// Deep-copy `v` out of another region into this builder.
    ///
    /// The copy follows the value tags only, so it works without a schema.
    /// Nested containers stay Blob32. A value referenced from several places
    /// is copied once.
    pub fn write_copy(&mut self, src: DbView<'_>, v: Val) -> Result<Val> {
        self.copy_val(src, v, 0, &mut HashMap::new())
    }

    fn copy_val(
        &mut self,
        src: DbView<'_>,
        v: Val,
        depth: usize,
        copied: &mut HashMap<Val, Val>,
    ) -> Result<Val> {
        if depth > MAX_DEPTH {
            return Err(AdbError::Unsupported("value graph nested too deeply"));
        }
        if let Some(&done) = copied.get(&v) {
            return Ok(done);
        }
        let out = match v.ty() {
            ValType::Special | ValType::Int => return Ok(v),
            ValType::Int32 | ValType::Int64 => self.write_int(src.int(v)?)?,
            ValType::Blob8 | ValType::Blob16 => self.write_blob(src.blob(v)?)?,
            ValType::Blob32 => self.write_blob32(src.blob(v)?)?,
            ValType::Object | ValType::Array => {
                let slots = src.slots(v)?;
                let mut bytes = Vec::with_capacity(slots.len());
                bytes.extend_from_slice(&slots[..4]);
                for word in slots[4..].chunks_exact(4) {
                    let item = Val::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    let item = self.copy_val(src, item, depth + 1, copied)?;
                    bytes.extend_from_slice(&item.to_le_bytes());
                }
                let at = self.write_data(&[&bytes], 4)?;
                Val::new(v.ty(), at)
            }
            ValType::Error => return Err(AdbError::ErrorValue(v.payload())),
            found @ ValType::Reserved(_) => {
                return Err(AdbError::TypeMismatch {
                    expected: "value",
                    found,
                });
            }
        };
        copied.insert(v, out);
        Ok(out)
    }

    /// Parse `text` as a value of `kind` and write it.
    pub fn write_from_str(&mut self, kind: Kind, text: &str) -> Result<Val> {
        match kind {
            Kind::Scalar(s) => (s.from_text)(self, text),
            Kind::Object(_) | Kind::Array(_) => {
                let Some(schema) = kind.as_obj() else {
                    return Err(AdbError::Unsupported("text conversion"));
                };
                let mut w = ObjWriter::new(schema);
                w.fill_from_str(self, text)?;
                self.write_obj(&mut w)
            }
            Kind::Adb(_) => Err(AdbError::Unsupported("nested container from text")),
        }
    }

    /// Append the root word. It must stay the last thing written.
    pub fn set_root(&mut self, v: Val) -> Result<()> {
        self.write_raw(&[&v.to_le_bytes()], 4)?;
        self.root = Some(v);
        Ok(())
    }

    /// Commit `w` and make it the root.
    pub fn set_root_obj(&mut self, w: &mut ObjWriter) -> Result<Val> {
        let v = self.write_obj(w)?;
        self.set_root(v)?;
        Ok(v)
    }

    /// Serialize into a complete file image, signed with `trust`'s private keys.
    pub fn to_bytes(&self, trust: Option<&Trust>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.buf.len() + 64);
        crate::create::create(&mut out, self, trust)?;
        Ok(out)
    }

    /// Serialize to `path`, replacing any existing file.
    pub fn write_file(&self, path: &Path, trust: Option<&Trust>) -> Result<()> {
        let mut os = BufWriter::new(File::create(path)?);
        crate::create::create(&mut os, self, trust)?;
        os.flush()?;
        Ok(())
    }
}

fn same_bytes(buf: &[u8], offset: u32, parts: &[&[u8]]) -> bool {
    let mut at = offset as usize;
    parts.iter().all(|part| {
        let matches = buf.get(at..at + part.len()) == Some(*part);
        at += part.len();
        matches
    })
}

/// Staging area for one object or array.
///
/// Slot 0 is reserved for the count and filled in on commit; fields and
/// items are addressed from 1.
#[derive(Debug, Clone)]
pub struct ObjWriter {
    schema: ObjSchema,
    slots: Vec<Val>,
}

impl ObjWriter {
    /// Empty writer for an object or array schema.
    pub fn new(schema: impl Into<ObjSchema>) -> Self {
        Self {
            schema: schema.into(),
            slots: vec![Val::NULL],
        }
    }

    /// Schema the writer was created for.
    pub fn schema(&self) -> ObjSchema {
        self.schema
    }

    /// Highest slot set so far.
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    /// True if nothing has been set.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value staged in slot `i`.
    pub fn get(&self, i: usize) -> Val {
        match i {
            NUM_ENTRIES => Val::NULL,
            _ => self.slots.get(i).copied().unwrap_or(Val::NULL),
        }
    }

    /// Staged fields or items, slot 1 first.
    pub fn items(&self) -> &[Val] {
        &self.slots[FIRST..]
    }

    fn max_index(&self) -> usize {
        self.schema.max_fields().unwrap_or(self.slots.len())
    }

    /// Stage `v` in slot `i`.
    ///
    /// Objects accept indexes up to their field count; arrays accept any
    /// existing index or the next free one.
    pub fn set(&mut self, i: usize, v: Val) -> Result<()> {
        let max = self.max_index();
        if i == NUM_ENTRIES || i > max {
            return Err(AdbError::FieldOutOfRange { index: i, max });
        }
        if v.is_error() {
            return Err(AdbError::ErrorValue(v.payload()));
        }
        if i >= self.slots.len() {
            self.slots.resize(i + 1, Val::NULL);
        }
        self.slots[i] = v;
        Ok(())
    }

    /// Write an integer and stage it in slot `i`.
    pub fn set_int(&mut self, b: &mut Builder, i: usize, n: u64) -> Result<()> {
        let v = b.write_int(n)?;
        self.set(i, v)
    }

    /// Write a blob and stage it in slot `i`.
    pub fn set_blob(&mut self, b: &mut Builder, i: usize, data: &[u8]) -> Result<()> {
        let v = b.write_blob(data)?;
        self.set(i, v)
    }

    /// Commit `child` and stage it in slot `i`.
    pub fn set_obj(&mut self, b: &mut Builder, i: usize, child: &mut ObjWriter) -> Result<()> {
        let v = b.write_obj(child)?;
        self.set(i, v)
    }

    /// Parse `text` with the slot's schema and stage it in slot `i`.
    pub fn set_from_str(&mut self, b: &mut Builder, i: usize, text: &str) -> Result<()> {
        let kind = self.schema.child(i).ok_or(AdbError::FieldOutOfRange {
            index: i,
            max: self.max_index(),
        })?;
        let v = b.write_from_str(kind, text)?;
        self.set(i, v)
    }

    /// Append an item to an array. Null items are skipped.
    pub fn append(&mut self, v: Val) -> Result<()> {
        if let ObjSchema::Object(_) = self.schema {
            return Err(AdbError::Unsupported("append to an object"));
        }
        if v.is_null() {
            return Ok(());
        }
        if v.is_error() {
            return Err(AdbError::ErrorValue(v.payload()));
        }
        self.slots.push(v);
        Ok(())
    }

    /// Commit `child` and append it.
    pub fn append_obj(&mut self, b: &mut Builder, child: &mut ObjWriter) -> Result<()> {
        let v = b.write_obj(child)?;
        self.append(v)
    }

    /// Parse `text` as an item and append it.
    pub fn append_from_str(&mut self, b: &mut Builder, text: &str) -> Result<()> {
        let kind = self
            .schema
            .child(FIRST)
            .ok_or(AdbError::Unsupported("append to an object"))?;
        let v = b.write_from_str(kind, text)?;
        self.append(v)
    }

    /// Populate from text: objects through their schema's parser, arrays one
    /// item per non-empty line.
    pub fn fill_from_str(&mut self, b: &mut Builder, text: &str) -> Result<()> {
        match self.schema {
            ObjSchema::Object(schema) => match schema.from_text {
                Some(parse) => parse(self, b, text),
                None => Err(AdbError::Unsupported("object has no text parser")),
            },
            ObjSchema::Array(_) => text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .try_for_each(|line| self.append_from_str(b, line)),
        }
    }

    /// Order array items with the item comparator. Values must have been
    /// written to `b`.
    pub fn sort(&mut self, b: &Builder) -> Result<()> {
        let ObjSchema::Array(arr) = self.schema else {
            return Err(AdbError::Unsupported("sort on an object"));
        };
        let view = b.view();
        self.slots[FIRST..].sort_by(|x, y| compare_values(arr.item, view, *x, view, *y));
        Ok(())
    }

    /// Sort, then drop items equal to their predecessor.
    pub fn sort_unique(&mut self, b: &Builder) -> Result<()> {
        self.sort(b)?;
        let ObjSchema::Array(arr) = self.schema else {
            return Ok(());
        };
        let view = b.view();
        let mut items = self.slots.split_off(FIRST);
        items.dedup_by(|x, y| compare_values(arr.item, view, *x, view, *y).is_eq());
        self.slots.extend(items);
        Ok(())
    }

    /// Clear all staged slots.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.slots.push(Val::NULL);
    }
}
