//! Error types for container decoding, building and trust checks.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::trust::{HashAlg, KeyId};
use crate::val::ValType;

/// Result alias used throughout the crate.
pub type Result<T, E = AdbError> = std::result::Result<T, E>;

/// Everything that can go wrong while reading, writing or verifying a container.
#[derive(Error, Debug)]
pub enum AdbError {
    /// Reading or writing the underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -- decode ------------------------------------------------------------
    /// A value's offset or length points outside the data region.
    #[error("value at offset {offset} (len {len}) is outside the {region}-byte data region")]
    OutOfBounds {
        /// Absolute offset inside the data region.
        offset: u64,
        /// Number of bytes the value needs.
        len: u64,
        /// Size of the data region.
        region: usize,
    },

    /// A value carries a different type tag than the caller required.
    #[error("type mismatch: expected {expected}, found {found:?}")]
    TypeMismatch {
        /// What the reader wanted.
        expected: &'static str,
        /// Tag actually stored.
        found: ValType,
    },

    /// A stored object has more fields than its schema declares.
    #[error("object stores {stored} fields but schema declares {declared}")]
    TooManyFields {
        /// Fields present in the file.
        stored: u32,
        /// Fields the schema knows about.
        declared: usize,
    },

    /// An object's count slot is zero.
    #[error("object or array has an invalid count slot")]
    BadCount,

    /// An Error-tagged value was found where data was expected.
    #[error("encountered error value (code {0})")]
    ErrorValue(u32),

    /// A field or slot index outside what the schema allows.
    #[error("field index {index} out of range (max {max})")]
    FieldOutOfRange {
        /// Requested 1-based index.
        index: usize,
        /// Largest valid index.
        max: usize,
    },

    // -- schema ------------------------------------------------------------
    /// The file does not start with the ADB magic.
    #[error("bad magic 0x{0:08x}, not an ADB file")]
    BadMagic(u32),

    /// The file's schema identifier is not the one requested.
    #[error("schema mismatch: expected 0x{expected:08x}, found 0x{found:08x}")]
    SchemaMismatch {
        /// Schema the caller asked for.
        expected: u32,
        /// Schema recorded in the header.
        found: u32,
    },

    /// Text could not be converted into a value of the given kind.
    #[error("cannot parse {input:?} as {kind}")]
    ParseText {
        /// Kind being parsed.
        kind: &'static str,
        /// Offending input.
        input: String,
    },

    /// The schema does not provide the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    // -- truncation --------------------------------------------------------
    /// A block header or payload extends past the end of the input.
    #[error("truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Offset of the block header.
        offset: usize,
        /// Bytes the block declares (header included).
        needed: u64,
        /// Bytes left in the input.
        available: usize,
    },

    /// Block sequence ended without an End block.
    #[error("block sequence is not terminated")]
    MissingTerminator,

    /// No Adb block was found in the file.
    #[error("no ADB data block present")]
    NoDataBlock,

    // -- trust -------------------------------------------------------------
    /// Signature verification or key handling failed.
    #[error(transparent)]
    Trust(#[from] TrustError),

    // -- builder -----------------------------------------------------------
    /// The builder's buffer limit would be exceeded.
    #[error("write of {requested} bytes exceeds buffer limit of {limit} bytes")]
    CapacityExceeded {
        /// Total size the write would produce.
        requested: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The builder was serialized before a root value was set.
    #[error("no root value written")]
    MissingRoot,
}

/// Per-signature and key-loading failures.
#[derive(Error, Debug, Clone)]
pub enum TrustError {
    /// No trusted key carries the signature's key id.
    #[error("signature key {0} is not trusted")]
    UnknownKey(KeyId),

    /// The signature does not verify against the data.
    #[error("signature by key {0} does not match")]
    SignatureMismatch(KeyId),

    /// The signature uses a digest this build cannot compute.
    #[error("unsupported hash algorithm {0}")]
    UnsupportedHash(HashAlg),

    /// Unknown signature record version.
    #[error("unsupported signature version {0}")]
    UnsupportedVersion(u8),

    /// There is no data block for the signature to cover.
    #[error("no data block to digest")]
    MissingData,

    /// The signature block is too short or otherwise garbled.
    #[error("malformed signature block")]
    MalformedSignature,

    /// No signature satisfied the trust policy.
    #[error("no trusted signature found")]
    Untrusted,

    /// The policy requires a signature from this key and none verified.
    #[error("required key {0} did not sign")]
    MissingRequiredKey(KeyId),

    /// A key file could not be parsed.
    #[error("invalid key {}: {reason}", path.display())]
    InvalidKey {
        /// File the key came from.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}
