//! Schema descriptors.
//!
//! Schemas are immutable metadata declared as `static` items by the
//! application. They describe how the value graph of a container is typed:
//! which slot of an object holds which kind of value, what an array holds,
//! and how values are rendered, parsed and compared.
//!
//! ```
//! use adb_format::schema::{ArraySchema, Field, Kind, ObjectSchema, BLOB, INT};
//!
//! static DEPENDS: ArraySchema = ArraySchema::new(Kind::Scalar(&BLOB));
//! static PACKAGE: ObjectSchema = ObjectSchema::new(&[
//!     Field::new("name", Kind::Scalar(&BLOB)),
//!     Field::new("size", Kind::Scalar(&INT)),
//!     Field::new("depends", Kind::Array(&DEPENDS)),
//! ]);
//!
//! assert_eq!(PACKAGE.field_by_name("size"), Some(2));
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::builder::{Builder, ObjWriter};
use crate::error::{AdbError, Result};
use crate::val::{Val, ValType};
use crate::view::{DbView, Obj};

/// Renders a scalar value as text.
pub type ScalarToText = fn(DbView<'_>, Val) -> Result<String>;
/// Parses text into a scalar value written to the builder.
pub type ScalarFromText = fn(&mut Builder, &str) -> Result<Val>;
/// Three-way comparison of two scalar values, possibly from different containers.
pub type ScalarCompare = fn(DbView<'_>, Val, DbView<'_>, Val) -> Ordering;

/// Renders a whole object as text.
pub type ObjectToText = fn(&Obj<'_>) -> Result<String>;
/// Populates an object writer from text.
pub type ObjectFromText = fn(&mut ObjWriter, &mut Builder, &str) -> Result<()>;
/// Three-way comparison of two objects.
pub type ObjectCompare = fn(&Obj<'_>, &Obj<'_>) -> Ordering;
/// Hook run right before an object is written.
pub type PreCommit = fn(&mut ObjWriter, &mut Builder) -> Result<()>;

/// A schema node: one of the four descriptor kinds.
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    /// Integer or blob leaf.
    Scalar(&'static ScalarSchema),
    /// Object with named fields.
    Object(&'static ObjectSchema),
    /// Homogeneous array.
    Array(&'static ArraySchema),
    /// Nested container stored as a blob.
    Adb(&'static AdbSchema),
}

impl Kind {
    /// Short human name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Scalar(s) => s.kind.name(),
            Kind::Object(_) => "object",
            Kind::Array(_) => "array",
            Kind::Adb(_) => "adb",
        }
    }

    /// The object/array view schema, if this kind is a container of slots.
    pub fn as_obj(&self) -> Option<ObjSchema> {
        match *self {
            Kind::Object(s) => Some(ObjSchema::Object(s)),
            Kind::Array(s) => Some(ObjSchema::Array(s)),
            Kind::Scalar(_) | Kind::Adb(_) => None,
        }
    }
}

/// Leaf value families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Unsigned integer.
    Int,
    /// Byte string.
    Blob,
}

impl ScalarKind {
    /// Short human name.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Blob => "blob",
        }
    }
}

/// Descriptor of a leaf value.
pub struct ScalarSchema {
    /// Value family.
    pub kind: ScalarKind,
    /// Text form may span several lines.
    pub multiline: bool,
    /// Render to text.
    pub to_text: ScalarToText,
    /// Parse from text.
    pub from_text: ScalarFromText,
    /// Three-way compare.
    pub compare: ScalarCompare,
}

impl fmt::Debug for ScalarSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarSchema")
            .field("kind", &self.kind)
            .field("multiline", &self.multiline)
            .finish_non_exhaustive()
    }
}

/// Decimal integer.
pub static INT: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Int,
    multiline: false,
    to_text: int_to_text,
    from_text: int_from_text,
    compare: int_compare,
};

/// Byte string rendered as (lossy) UTF-8.
pub static BLOB: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: false,
    to_text: blob_to_text,
    from_text: blob_from_text,
    compare: blob_compare,
};

/// Like [`BLOB`] but rendered as a block of lines.
pub static TEXT: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: true,
    to_text: blob_to_text,
    from_text: blob_from_text,
    compare: blob_compare,
};

/// Byte string rendered as lowercase hex (checksums, key ids).
pub static HEXBLOB: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: false,
    to_text: hexblob_to_text,
    from_text: hexblob_from_text,
    compare: blob_compare,
};

fn int_to_text(view: DbView<'_>, v: Val) -> Result<String> {
    Ok(view.int(v)?.to_string())
}

fn int_from_text(b: &mut Builder, s: &str) -> Result<Val> {
    let n: u64 = s.trim().parse().map_err(|_| AdbError::ParseText {
        kind: "int",
        input: s.to_string(),
    })?;
    b.write_int(n)
}

fn int_compare(v1: DbView<'_>, a: Val, v2: DbView<'_>, b: Val) -> Ordering {
    v1.int(a).unwrap_or(0).cmp(&v2.int(b).unwrap_or(0))
}

fn blob_to_text(view: DbView<'_>, v: Val) -> Result<String> {
    Ok(String::from_utf8_lossy(view.blob(v)?).into_owned())
}

fn blob_from_text(b: &mut Builder, s: &str) -> Result<Val> {
    b.write_blob(s.as_bytes())
}

fn blob_compare(v1: DbView<'_>, a: Val, v2: DbView<'_>, b: Val) -> Ordering {
    v1.blob(a).unwrap_or(&[]).cmp(v2.blob(b).unwrap_or(&[]))
}

fn hexblob_to_text(view: DbView<'_>, v: Val) -> Result<String> {
    Ok(hex::encode(view.blob(v)?))
}

fn hexblob_from_text(b: &mut Builder, s: &str) -> Result<Val> {
    let bytes = hex::decode(s.trim()).map_err(|_| AdbError::ParseText {
        kind: "hex blob",
        input: s.to_string(),
    })?;
    b.write_blob(&bytes)
}

/// Value used when a field is absent from the stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldDefault {
    /// Zero / empty.
    #[default]
    None,
    /// A fixed integer.
    Int(u64),
    /// A fixed byte string.
    Blob(&'static [u8]),
}

/// A named, typed object slot.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Field name used for text conversion.
    pub name: &'static str,
    /// Type of the stored value.
    pub kind: Kind,
    /// Value reported when the field is missing.
    pub default: FieldDefault,
}

impl Field {
    /// A field with no special default.
    pub const fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            default: FieldDefault::None,
        }
    }

    /// Override the default reported when the field is absent.
    pub const fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }
}

/// Descriptor of an object: fixed, 1-based field positions.
pub struct ObjectSchema {
    /// Fields in slot order; `fields[0]` is slot 1.
    pub fields: &'static [Field],
    /// Whole-object text rendering.
    pub to_text: Option<ObjectToText>,
    /// Whole-object text parsing.
    pub from_text: Option<ObjectFromText>,
    /// Object ordering; field-by-field when absent.
    pub compare: Option<ObjectCompare>,
    /// Canonicalization hook run before the object is written.
    pub pre_commit: Option<PreCommit>,
}

impl ObjectSchema {
    /// Object schema with the given fields and no hooks.
    pub const fn new(fields: &'static [Field]) -> Self {
        Self {
            fields,
            to_text: None,
            from_text: None,
            compare: None,
            pre_commit: None,
        }
    }

    /// Set the text renderer.
    pub const fn with_to_text(mut self, f: ObjectToText) -> Self {
        self.to_text = Some(f);
        self
    }

    /// Set the text parser.
    pub const fn with_from_text(mut self, f: ObjectFromText) -> Self {
        self.from_text = Some(f);
        self
    }

    /// Set the comparator.
    pub const fn with_compare(mut self, f: ObjectCompare) -> Self {
        self.compare = Some(f);
        self
    }

    /// Set the pre-commit hook.
    pub const fn with_pre_commit(mut self, f: PreCommit) -> Self {
        self.pre_commit = Some(f);
        self
    }

    /// Number of declared fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Field descriptor at a 1-based index.
    pub fn field(&self, i: usize) -> Option<&Field> {
        i.checked_sub(1).and_then(|i| self.fields.get(i))
    }

    /// 1-based index of the field called `name`.
    pub fn field_by_name(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| i + 1)
    }
}

impl fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field(
                "fields",
                &self.fields.iter().map(|f| f.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Descriptor of an array: every item shares one kind.
#[derive(Debug)]
pub struct ArraySchema {
    /// Item kind.
    pub item: Kind,
}

impl ArraySchema {
    /// Array of `item`.
    pub const fn new(item: Kind) -> Self {
        Self { item }
    }
}

/// Descriptor of a nested container.
#[derive(Debug)]
pub struct AdbSchema {
    /// Schema identifier of the nested container. Nested payloads carry no
    /// header, so readers do not check it.
    pub schema_id: u32,
    /// Schema of the nested root object.
    pub root: &'static ObjectSchema,
}

impl AdbSchema {
    /// Nested container with the given id and root schema.
    pub const fn new(schema_id: u32, root: &'static ObjectSchema) -> Self {
        Self { schema_id, root }
    }
}

/// The schema of something that has slots: an object or an array.
#[derive(Debug, Clone, Copy)]
pub enum ObjSchema {
    /// Object slots are fields.
    Object(&'static ObjectSchema),
    /// Array slots are items.
    Array(&'static ArraySchema),
}

impl ObjSchema {
    /// Value tag this schema expects.
    pub fn val_type(self) -> ValType {
        match self {
            ObjSchema::Object(_) => ValType::Object,
            ObjSchema::Array(_) => ValType::Array,
        }
    }

    /// Short human name.
    pub fn name(self) -> &'static str {
        match self {
            ObjSchema::Object(_) => "object",
            ObjSchema::Array(_) => "array",
        }
    }

    /// Field limit for objects, `None` for arrays.
    pub fn max_fields(self) -> Option<usize> {
        match self {
            ObjSchema::Object(s) => Some(s.num_fields()),
            ObjSchema::Array(_) => None,
        }
    }

    /// Kind of slot `i` (1-based).
    pub fn child(self, i: usize) -> Option<Kind> {
        match self {
            ObjSchema::Object(s) => s.field(i).map(|f| f.kind),
            ObjSchema::Array(s) => (i >= 1).then_some(s.item),
        }
    }

    /// Default for slot `i`.
    pub fn default_for(self, i: usize) -> FieldDefault {
        match self {
            ObjSchema::Object(s) => s.field(i).map(|f| f.default).unwrap_or_default(),
            ObjSchema::Array(_) => FieldDefault::None,
        }
    }

    /// Name of slot `i`, if it is an object field.
    pub fn field_name(self, i: usize) -> Option<&'static str> {
        match self {
            ObjSchema::Object(s) => s.field(i).map(|f| f.name),
            ObjSchema::Array(_) => None,
        }
    }
}

impl From<&'static ObjectSchema> for ObjSchema {
    fn from(s: &'static ObjectSchema) -> Self {
        ObjSchema::Object(s)
    }
}

impl From<&'static ArraySchema> for ObjSchema {
    fn from(s: &'static ArraySchema) -> Self {
        ObjSchema::Array(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TAGS: ArraySchema = ArraySchema::new(Kind::Scalar(&BLOB));
    static ITEM: ObjectSchema = ObjectSchema::new(&[
        Field::new("name", Kind::Scalar(&BLOB)),
        Field::new("count", Kind::Scalar(&INT)).with_default(FieldDefault::Int(7)),
        Field::new("tags", Kind::Array(&TAGS)),
    ]);

    #[test]
    fn field_lookup_is_one_based() {
        assert_eq!(ITEM.num_fields(), 3);
        assert_eq!(ITEM.field_by_name("name"), Some(1));
        assert_eq!(ITEM.field_by_name("tags"), Some(3));
        assert_eq!(ITEM.field_by_name("missing"), None);
        assert!(ITEM.field(0).is_none());
        assert_eq!(ITEM.field(2).unwrap().name, "count");
    }

    #[test]
    fn obj_schema_dispatch() {
        let obj = ObjSchema::from(&ITEM);
        assert_eq!(obj.val_type(), ValType::Object);
        assert_eq!(obj.max_fields(), Some(3));
        assert_eq!(obj.default_for(2), FieldDefault::Int(7));
        assert_eq!(obj.default_for(9), FieldDefault::None);
        assert!(matches!(obj.child(3), Some(Kind::Array(_))));

        let arr = ObjSchema::from(&TAGS);
        assert_eq!(arr.val_type(), ValType::Array);
        assert_eq!(arr.max_fields(), None);
        assert!(matches!(arr.child(42), Some(Kind::Scalar(_))));
        assert!(arr.child(0).is_none());
    }

    #[test]
    fn kind_names() {
        assert_eq!(Kind::Scalar(&INT).name(), "int");
        assert_eq!(Kind::Scalar(&HEXBLOB).name(), "blob");
        assert_eq!(Kind::Object(&ITEM).name(), "object");
        assert!(Kind::Scalar(&TEXT).as_obj().is_none());
        assert!(Kind::Array(&TAGS).as_obj().is_some());
    }
}
