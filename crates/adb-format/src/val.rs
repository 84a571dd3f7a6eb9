//! 32-bit tagged values.
//!
//! Every scalar, reference and error sentinel stored in a container is a
//! single little-endian `u32`. The top nibble is the type tag, the low 28 bits
//! are either an immediate payload or a byte offset into the data region.

use std::fmt;

/// Mask selecting the type tag.
pub const TYPE_MASK: u32 = 0xf000_0000;
/// Mask selecting the payload.
pub const VALUE_MASK: u32 = 0x0fff_ffff;

/// Slot index holding the entry count of an object or array.
pub const NUM_ENTRIES: usize = 0;
/// First field/item slot.
pub const FIRST: usize = 1;

/// Type tag of a [`Val`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    /// Null, true, false.
    Special,
    /// Integer stored inline in the payload.
    Int,
    /// 4-byte integer stored out of line.
    Int32,
    /// 8-byte integer stored out of line.
    Int64,
    /// Byte string with a 1-byte length prefix.
    Blob8,
    /// Byte string with a 2-byte length prefix.
    Blob16,
    /// Byte string with a 4-byte length prefix.
    Blob32,
    /// Run of item slots.
    Array,
    /// Run of field slots.
    Object,
    /// Out-of-band error sentinel.
    Error,
    /// A tag nibble with no assigned meaning.
    Reserved(u8),
}

impl ValType {
    /// Decode a tag from the top nibble of a raw word.
    pub fn from_raw(raw: u32) -> Self {
        match raw >> 28 {
            0x0 => Self::Special,
            0x1 => Self::Int,
            0x2 => Self::Int32,
            0x3 => Self::Int64,
            0x8 => Self::Blob8,
            0x9 => Self::Blob16,
            0xa => Self::Blob32,
            0xd => Self::Array,
            0xe => Self::Object,
            0xf => Self::Error,
            other => Self::Reserved(other as u8),
        }
    }

    /// The tag bits for this type, already shifted into place.
    pub const fn bits(self) -> u32 {
        let nibble: u32 = match self {
            Self::Special => 0x0,
            Self::Int => 0x1,
            Self::Int32 => 0x2,
            Self::Int64 => 0x3,
            Self::Blob8 => 0x8,
            Self::Blob16 => 0x9,
            Self::Blob32 => 0xa,
            Self::Array => 0xd,
            Self::Object => 0xe,
            Self::Error => 0xf,
            Self::Reserved(n) => (n & 0xf) as u32,
        };
        nibble << 28
    }

    /// True for the three blob widths.
    pub fn is_blob(self) -> bool {
        matches!(self, Self::Blob8 | Self::Blob16 | Self::Blob32)
    }

    /// True for the three integer encodings.
    pub fn is_int(self) -> bool {
        matches!(self, Self::Int | Self::Int32 | Self::Int64)
    }
}

/// A tagged value as stored on disk.
///
/// The wrapped word is host-order; conversion to and from the little-endian
/// wire form happens in [`Val::from_le_bytes`] and [`Val::to_le_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Val(u32);

impl Val {
    /// The Null special.
    pub const NULL: Val = Val(0);
    /// The boolean true special.
    pub const TRUE: Val = Val(1);
    /// The boolean false special.
    pub const FALSE: Val = Val(2);

    /// Largest integer that fits inline.
    pub const MAX_INLINE: u64 = VALUE_MASK as u64;

    /// Combine a tag and a payload. The payload is masked to 28 bits.
    pub const fn new(ty: ValType, payload: u32) -> Self {
        Val(ty.bits() | (payload & VALUE_MASK))
    }

    /// An inline integer, or `None` if `v` needs out-of-line storage.
    pub fn inline_int(v: u64) -> Option<Self> {
        if v <= Self::MAX_INLINE {
            Some(Self::new(ValType::Int, v as u32))
        } else {
            None
        }
    }

    /// A boolean special.
    pub const fn bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// An error sentinel carrying `code`.
    pub const fn error(code: u32) -> Self {
        Self::new(ValType::Error, code)
    }

    /// Wrap a raw host-order word.
    pub const fn from_raw(raw: u32) -> Self {
        Val(raw)
    }

    /// The raw host-order word.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Decode from the little-endian wire form.
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Val(u32::from_le_bytes(bytes))
    }

    /// Encode to the little-endian wire form.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// The type tag.
    pub fn ty(self) -> ValType {
        ValType::from_raw(self.0)
    }

    /// The 28-bit payload (immediate value, offset or error code).
    pub fn payload(self) -> u32 {
        self.0 & VALUE_MASK
    }

    /// True if this is an error sentinel.
    pub fn is_error(self) -> bool {
        self.0 & TYPE_MASK == TYPE_MASK
    }

    /// True for the Null special.
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty() {
            ValType::Special => match *self {
                Val::NULL => write!(f, "Val(null)"),
                Val::TRUE => write!(f, "Val(true)"),
                Val::FALSE => write!(f, "Val(false)"),
                _ => write!(f, "Val(special {})", self.payload()),
            },
            ValType::Int => write!(f, "Val(int {})", self.payload()),
            ValType::Error => write!(f, "Val(error {})", self.payload()),
            ty => write!(f, "Val({ty:?} @0x{:x})", self.payload()),
        }
    }
}

/// Length-prefix width needed for a blob of `len` bytes.
pub fn blob_type_for_len(len: usize) -> ValType {
    if len > 0xffff {
        ValType::Blob32
    } else if len > 0xff {
        ValType::Blob16
    } else {
        ValType::Blob8
    }
}

/// Size in bytes of the length prefix for a blob tag.
pub fn blob_prefix_len(ty: ValType) -> Option<usize> {
    match ty {
        ValType::Blob8 => Some(1),
        ValType::Blob16 => Some(2),
        ValType::Blob32 => Some(4),
        _ => None,
    }
}

/// Encode the length prefix for a blob of `len` bytes.
pub fn blob_prefix(len: usize) -> (ValType, Vec<u8>) {
    let ty = blob_type_for_len(len);
    let prefix = match ty {
        ValType::Blob8 => vec![len as u8],
        ValType::Blob16 => (len as u16).to_le_bytes().to_vec(),
        _ => (len as u32).to_le_bytes().to_vec(),
    };
    (ty, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_payload_split() {
        let v = Val::new(ValType::Object, 0x1234);
        assert_eq!(v.ty(), ValType::Object);
        assert_eq!(v.payload(), 0x1234);
        assert_eq!(v.raw(), 0xe000_1234);
    }

    #[test]
    fn payload_is_masked() {
        let v = Val::new(ValType::Int, 0xffff_ffff);
        assert_eq!(v.ty(), ValType::Int);
        assert_eq!(v.payload(), VALUE_MASK);
    }

    #[test]
    fn inline_int_limits() {
        assert_eq!(Val::inline_int(0), Some(Val::new(ValType::Int, 0)));
        assert!(Val::inline_int(Val::MAX_INLINE).is_some());
        assert!(Val::inline_int(Val::MAX_INLINE + 1).is_none());
    }

    #[test]
    fn specials_and_errors() {
        assert!(Val::NULL.is_null());
        assert_eq!(Val::bool(true), Val::TRUE);
        assert_eq!(Val::TRUE.ty(), ValType::Special);
        let e = Val::error(22);
        assert!(e.is_error());
        assert_eq!(e.payload(), 22);
        assert!(!Val::TRUE.is_error());
    }

    #[test]
    fn wire_form_is_little_endian() {
        let v = Val::new(ValType::Blob8, 8);
        assert_eq!(v.to_le_bytes(), [0x08, 0x00, 0x00, 0x80]);
        assert_eq!(Val::from_le_bytes(v.to_le_bytes()), v);
    }

    #[test]
    fn blob_width_boundaries() {
        assert_eq!(blob_type_for_len(0), ValType::Blob8);
        assert_eq!(blob_type_for_len(255), ValType::Blob8);
        assert_eq!(blob_type_for_len(256), ValType::Blob16);
        assert_eq!(blob_type_for_len(65535), ValType::Blob16);
        assert_eq!(blob_type_for_len(65536), ValType::Blob32);
        assert_eq!(blob_prefix(300).1, vec![0x2c, 0x01]);
    }

    #[test]
    fn reserved_tags_are_preserved() {
        let raw = 0x5000_0001;
        assert_eq!(ValType::from_raw(raw), ValType::Reserved(5));
        assert_eq!(ValType::Reserved(5).bits(), 0x5000_0000);
    }
}
