//! Serializing containers.

use std::io::Write;

use tracing::debug;

use crate::block::{BlockType, Header, write_block, write_end, write_header};
use crate::builder::Builder;
use crate::db::Db;
use crate::error::{AdbError, Result};
use crate::trust::{Trust, VerifyCtx};

/// Write a finished builder as `header | Adb | Sig* | End`.
///
/// One signature is written per private key in `trust`.
pub fn create<W: Write + ?Sized>(os: &mut W, builder: &Builder, trust: Option<&Trust>) -> Result<()> {
    if builder.root().is_none() {
        return Err(AdbError::MissingRoot);
    }
    let signatures = write_container(os, builder.header(), builder.payload(), trust)?;
    debug!(
        schema = builder.schema(),
        bytes = builder.len(),
        signatures,
        dedup_hits = builder.stats().hits,
        "container written"
    );
    Ok(())
}

/// Copy the payload of an opened container, dropping its old signatures and
/// adding fresh ones from `trust`. Unknown blocks are not carried over.
pub fn copy<W: Write + ?Sized>(os: &mut W, db: &Db, trust: Option<&Trust>) -> Result<usize> {
    write_container(os, db.header(), db.view().data(), trust)
}

fn write_container<W: Write + ?Sized>(
    os: &mut W,
    header: Header,
    payload: &[u8],
    trust: Option<&Trust>,
) -> Result<usize> {
    write_header(os, header)?;
    write_block(os, BlockType::Adb, payload)?;
    let signatures = match trust {
        Some(trust) => trust.write_signatures(os, header, Some(payload), &mut VerifyCtx::new())?,
        None => 0,
    };
    write_end(os)?;
    Ok(signatures)
}
