//! Zero-copy reader over a data region.
//!
//! [`DbView`] wraps the payload of an Adb block (or a builder's buffer, or a
//! nested container blob) and resolves [`Val`]s against it. Every dereference
//! is bounds checked: a value whose offset or length points outside the region
//! yields [`AdbError::OutOfBounds`], never a panic.

use std::cmp::Ordering;

use crate::error::{AdbError, Result};
use crate::schema::{AdbSchema, ArraySchema, FieldDefault, Kind, ObjSchema, ObjectSchema};
use crate::val::{FIRST, NUM_ENTRIES, Val, ValType, blob_prefix_len};

/// Recursion limit for walks that are not bounded by a schema.
pub const MAX_DEPTH: usize = 64;

/// Borrowed data region values are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct DbView<'a> {
    data: &'a [u8],
}

impl<'a> DbView<'a> {
    /// View over a raw data region.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The underlying bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Size of the region.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty region.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The root value: the last word of the region, or Null if there is none.
    pub fn root(&self) -> Val {
        match self.data.len().checked_sub(4) {
            Some(at) => Val::from_le_bytes([
                self.data[at],
                self.data[at + 1],
                self.data[at + 2],
                self.data[at + 3],
            ]),
            None => Val::NULL,
        }
    }

    /// The root value interpreted as an object of `schema`.
    pub fn root_object(&self, schema: &'static ObjectSchema) -> Result<Obj<'a>> {
        self.obj(self.root(), schema)
    }

    /// `size` bytes at `offs` past the value's offset.
    pub fn deref(&self, v: Val, offs: usize, size: usize) -> Result<&'a [u8]> {
        let start = u64::from(v.payload()) + offs as u64;
        let end = start + size as u64;
        if end > self.data.len() as u64 {
            return Err(AdbError::OutOfBounds {
                offset: start,
                len: size as u64,
                region: self.data.len(),
            });
        }
        Ok(&self.data[start as usize..end as usize])
    }

    /// Decode an integer. Null reads as zero.
    pub fn int(&self, v: Val) -> Result<u64> {
        match v.ty() {
            ValType::Special if v.is_null() => Ok(0),
            ValType::Int => Ok(u64::from(v.payload())),
            ValType::Int32 => {
                let b = self.deref(v, 0, 4)?;
                Ok(u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            }
            ValType::Int64 => {
                let b = self.deref(v, 0, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(u64::from_le_bytes(raw))
            }
            ValType::Error => Err(AdbError::ErrorValue(v.payload())),
            found => Err(AdbError::TypeMismatch {
                expected: "int",
                found,
            }),
        }
    }

    /// Decode a byte string. Null reads as empty.
    pub fn blob(&self, v: Val) -> Result<&'a [u8]> {
        let ty = v.ty();
        if v.is_null() {
            return Ok(&[]);
        }
        if ty == ValType::Error {
            return Err(AdbError::ErrorValue(v.payload()));
        }
        let Some(prefix) = blob_prefix_len(ty) else {
            return Err(AdbError::TypeMismatch {
                expected: "blob",
                found: ty,
            });
        };
        let head = self.deref(v, 0, prefix)?;
        let len = match prefix {
            1 => usize::from(head[0]),
            2 => usize::from(u16::from_le_bytes([head[0], head[1]])),
            _ => u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize,
        };
        self.deref(v, prefix, len)
    }

    /// Decode a boolean special. Null reads as false.
    pub fn bool(&self, v: Val) -> Result<bool> {
        match v {
            Val::TRUE => Ok(true),
            Val::FALSE | Val::NULL => Ok(false),
            _ if v.is_error() => Err(AdbError::ErrorValue(v.payload())),
            _ => Err(AdbError::TypeMismatch {
                expected: "bool",
                found: v.ty(),
            }),
        }
    }

    /// The raw slot run of an object or array value, count slot included.
    pub fn slots(&self, v: Val) -> Result<&'a [u8]> {
        let head = self.deref(v, 0, 4)?;
        let num = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        if num == 0 {
            return Err(AdbError::BadCount);
        }
        let size = (num as usize).checked_mul(4).ok_or(AdbError::BadCount)?;
        self.deref(v, 0, size)
    }

    /// Open `v` as an object or array described by `schema`.
    ///
    /// A Null value opens as an empty view so absent sub-objects read like
    /// objects with every field defaulted.
    pub fn obj(&self, v: Val, schema: impl Into<ObjSchema>) -> Result<Obj<'a>> {
        let schema = schema.into();
        if v.is_null() {
            return Ok(Obj::empty(*self, schema));
        }
        if v.is_error() {
            return Err(AdbError::ErrorValue(v.payload()));
        }
        if v.ty() != schema.val_type() {
            return Err(AdbError::TypeMismatch {
                expected: schema.name(),
                found: v.ty(),
            });
        }
        let slots = self.slots(v)?;
        let num = (slots.len() / 4) as u32;
        if let Some(max) = schema.max_fields() {
            let stored = num - 1;
            if stored as usize > max {
                return Err(AdbError::TooManyFields {
                    stored,
                    declared: max,
                });
            }
        }
        Ok(Obj {
            view: *self,
            schema,
            num,
            slots,
        })
    }

    /// Open `v` as an array.
    pub fn array(&self, v: Val, schema: &'static ArraySchema) -> Result<Obj<'a>> {
        self.obj(v, schema)
    }

    /// Open a nested container stored as a blob.
    pub fn nested(&self, v: Val) -> Result<DbView<'a>> {
        Ok(DbView::new(self.blob(v)?))
    }
}

/// Short-lived view of one object or array inside a region.
#[derive(Debug, Clone, Copy)]
pub struct Obj<'a> {
    view: DbView<'a>,
    schema: ObjSchema,
    num: u32,
    slots: &'a [u8],
}

impl<'a> Obj<'a> {
    fn empty(view: DbView<'a>, schema: ObjSchema) -> Self {
        Self {
            view,
            schema,
            num: 1,
            slots: &[],
        }
    }

    /// Region the object lives in.
    pub fn view(&self) -> DbView<'a> {
        self.view
    }

    /// Schema used to interpret the slots.
    pub fn schema(&self) -> ObjSchema {
        self.schema
    }

    /// Raw slot count, count slot included.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Stored fields of an object, or items of an array.
    pub fn len(&self) -> usize {
        self.num.saturating_sub(1) as usize
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value in slot `i`; Null past the stored count.
    pub fn val(&self, i: usize) -> Val {
        if i == NUM_ENTRIES || i >= self.num as usize {
            return Val::NULL;
        }
        let at = i * 4;
        Val::from_le_bytes([
            self.slots[at],
            self.slots[at + 1],
            self.slots[at + 2],
            self.slots[at + 3],
        ])
    }

    /// Items `1..=len` as raw values.
    pub fn items(&self) -> impl Iterator<Item = Val> + '_ {
        (FIRST..self.num as usize).map(move |i| self.val(i))
    }

    /// Integer in slot `i`, falling back to the schema default.
    pub fn int(&self, i: usize) -> Result<u64> {
        let v = self.val(i);
        match self.schema.default_for(i) {
            FieldDefault::Int(d) if v.is_null() => Ok(d),
            _ => self.view.int(v),
        }
    }

    /// Blob in slot `i`, falling back to the schema default.
    pub fn blob(&self, i: usize) -> Result<&'a [u8]> {
        let v = self.val(i);
        match self.schema.default_for(i) {
            FieldDefault::Blob(d) if v.is_null() => Ok(d),
            _ => self.view.blob(v),
        }
    }

    /// Object or array in slot `i`, typed by the slot's schema.
    pub fn obj(&self, i: usize) -> Result<Obj<'a>> {
        match self.schema.child(i).and_then(|k| k.as_obj()) {
            Some(schema) => self.view.obj(self.val(i), schema),
            None => Err(AdbError::Unsupported("slot is not an object or array")),
        }
    }

    /// Root object of the nested container in slot `i`.
    pub fn adb(&self, i: usize) -> Result<Obj<'a>> {
        match self.schema.child(i) {
            Some(Kind::Adb(nested)) => self.nested_root(i, nested),
            _ => Err(AdbError::Unsupported("slot is not a nested container")),
        }
    }

    fn nested_root(&self, i: usize, nested: &'static AdbSchema) -> Result<Obj<'a>> {
        let inner = self.view.nested(self.val(i))?;
        inner.root_object(nested.root)
    }

    /// Compare slot `i` of two objects with the slot's own comparator.
    pub fn cmp_field(&self, other: &Obj<'_>, i: usize) -> Ordering {
        match self.schema.child(i) {
            Some(kind) => compare_values(kind, self.view, self.val(i), other.view, other.val(i)),
            None => self.val(i).raw().cmp(&other.val(i).raw()),
        }
    }

    /// Compare two objects: schema comparator, else slot by slot.
    pub fn compare(&self, other: &Obj<'_>) -> Ordering {
        if let ObjSchema::Object(schema) = self.schema {
            if let Some(cmp) = schema.compare {
                return cmp(self, other);
            }
            return (FIRST..=schema.num_fields())
                .map(|i| self.cmp_field(other, i))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal);
        }
        let n = self.num.max(other.num) as usize;
        (FIRST..n)
            .map(|i| self.cmp_field(other, i))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| self.num.cmp(&other.num))
    }

    /// Find an item equal to `v` (resolved in `view`) in a sorted array.
    ///
    /// With `cur == 0` this binary-searches for the first match. With a
    /// previous result it returns the next index if that item matches too,
    /// so all equal items can be visited in order. The array must be sorted
    /// with the item comparator; otherwise the answer is unspecified.
    pub fn find(&self, cur: usize, view: DbView<'_>, v: Val) -> Option<usize> {
        let ObjSchema::Array(arr) = self.schema else {
            return None;
        };
        let cmp_at = |i: usize| compare_values(arr.item, self.view, self.val(i), view, v);
        let num = self.num as usize;
        if cur == 0 {
            let (mut lo, mut hi) = (FIRST, num);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if cmp_at(mid).is_lt() {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            (lo < num && cmp_at(lo).is_eq()).then_some(lo)
        } else {
            let next = cur + 1;
            (next < num && cmp_at(next).is_eq()).then_some(next)
        }
    }

    /// Render as text using the schema's renderer, or the generic dump.
    pub fn to_text(&self) -> Result<String> {
        match self.schema {
            ObjSchema::Object(&ObjectSchema {
                to_text: Some(render),
                ..
            }) => render(self),
            _ => crate::dump::render_obj(self),
        }
    }
}

/// Three-way compare of two values of `kind`, possibly from different regions.
///
/// Undecodable values compare as if empty.
pub fn compare_values(kind: Kind, v1: DbView<'_>, a: Val, v2: DbView<'_>, b: Val) -> Ordering {
    match kind {
        Kind::Scalar(s) => (s.compare)(v1, a, v2, b),
        Kind::Object(_) | Kind::Array(_) => {
            let Some(schema) = kind.as_obj() else {
                return Ordering::Equal;
            };
            let o1 = v1.obj(a, schema).unwrap_or(Obj::empty(v1, schema));
            let o2 = v2.obj(b, schema).unwrap_or(Obj::empty(v2, schema));
            o1.compare(&o2)
        }
        Kind::Adb(_) => v1.blob(a).unwrap_or(&[]).cmp(v2.blob(b).unwrap_or(&[])),
    }
}
