//! Schema-typed binary containers.
//!
//! A container is an 8-byte header followed by aligned blocks: one Adb block
//! holding a tree of tagged 32-bit values, optional Sig blocks signing that
//! tree, and an End block. Readers map the file and decode values in place;
//! writers build the tree bottom-up, sharing identical values.
//!
//! ```
//! use adb_format::schema::{AdbSchema, Field, INT, Kind, ObjectSchema, TEXT};
//! use adb_format::{Builder, Db, ObjWriter, PrivateKey, Trust};
//!
//! static ROOT: ObjectSchema = ObjectSchema::new(&[
//!     Field::new("name", Kind::Scalar(&TEXT)),
//!     Field::new("size", Kind::Scalar(&INT)),
//! ]);
//! static FILE: AdbSchema = AdbSchema::new(0x7473_6574, &ROOT);
//!
//! # fn main() -> adb_format::Result<()> {
//! let key = PrivateKey::from_bytes(&[7; 32]);
//! let mut trust = Trust::new();
//! trust.add_trusted(key.public());
//! trust.add_private(key);
//!
//! let mut b = Builder::new(FILE.schema_id);
//! let mut w = ObjWriter::new(&ROOT);
//! w.set_blob(&mut b, 1, b"zlib")?;
//! w.set_int(&mut b, 2, 104_857)?;
//! b.set_root_obj(&mut w)?;
//! let bytes = b.to_bytes(Some(&trust))?;
//!
//! let db = Db::from_bytes(bytes, Some(FILE.schema_id), Some(&trust))?;
//! let root = db.root_object(&FILE)?;
//! assert_eq!(root.blob(1)?, b"zlib");
//! assert_eq!(root.int(2)?, 104_857);
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod builder;
pub mod create;
pub mod db;
mod dedup;
pub mod dump;
pub mod error;
pub mod schema;
pub mod trust;
pub mod val;
pub mod view;
pub mod xfrm;

// Re-exports
pub use builder::{Builder, ObjWriter};
pub use db::Db;
pub use dedup::DedupStats;
pub use error::{AdbError, Result, TrustError};
pub use schema::{AdbSchema, ArraySchema, Kind, ObjSchema, ObjectSchema, ScalarSchema};
pub use trust::{HashAlg, KeyId, PrivateKey, PublicKey, SignatureReport, Trust, TrustPolicy};
pub use val::{Val, ValType};
pub use view::{DbView, Obj};
pub use xfrm::{BlockFilter, Disposition, Resign, StripSignatures, Transform};
