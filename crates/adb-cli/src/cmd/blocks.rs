//! Blocks command

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use adb_format::block::{BlockType, Blocks, HEADER_LEN, Header};
use adb_format::trust::SignatureRecord;
use anyhow::{Context, Result};

/// Print the header and block list of a container.
pub fn blocks(path: &Path) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    print!("{}", describe(&data)?);
    Ok(())
}

/// One line per block with its offset, type and payload size. Sig blocks
/// also name their signer.
pub fn describe(data: &[u8]) -> Result<String> {
    let header = Header::parse(data)?;
    let mut out = String::new();
    writeln!(out, "  schema  {:#010x}", header.schema)?;

    let mut iter = Blocks::new(&data[HEADER_LEN..]);
    for block in iter.by_ref() {
        let block = block?;
        let offset = HEADER_LEN + block.offset;
        write!(
            out,
            "  {offset:>8}  {:<10} {:>10} bytes",
            block.header.ty.to_string(),
            block.payload.len()
        )?;
        if block.header.ty == BlockType::Sig {
            match SignatureRecord::parse(block.payload) {
                Ok(record) => write!(out, "  {} key {}", record.hash_alg, record.key_id)?,
                Err(e) => write!(out, "  ({e})")?,
            }
        }
        out.push('\n');
    }
    if iter.terminated() {
        writeln!(out, "  end")?;
    } else {
        writeln!(out, "  (no end block)")?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adb_format::schema::{BLOB, Field, Kind, ObjectSchema};
    use adb_format::{Builder, ObjWriter, PrivateKey, Trust};

    static ROOT: ObjectSchema = ObjectSchema::new(&[Field::new("name", Kind::Scalar(&BLOB))]);

    #[test]
    fn lists_each_block() {
        let key = PrivateKey::from_bytes(&[3; 32]);
        let mut trust = Trust::new();
        trust.add_private(key.clone());

        let mut b = Builder::new(0x10);
        let mut w = ObjWriter::new(&ROOT);
        w.set_blob(&mut b, 1, b"busybox").unwrap();
        b.set_root_obj(&mut w).unwrap();
        let bytes = b.to_bytes(Some(&trust)).unwrap();

        let text = describe(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  schema  0x00000010");
        assert!(lines[1].contains("adb"));
        assert!(lines[2].contains("sig"));
        assert!(lines[2].contains(&key.id().to_string()));
        assert_eq!(lines[3], "  end");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn flags_missing_terminator() {
        let mut b = Builder::new(1);
        let mut w = ObjWriter::new(&ROOT);
        w.set_blob(&mut b, 1, b"x").unwrap();
        b.set_root_obj(&mut w).unwrap();
        let mut bytes = b.to_bytes(None).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(describe(&bytes).unwrap().ends_with("(no end block)\n"));
    }
}
