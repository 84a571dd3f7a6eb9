//! Text rendering of value trees.
//!
//! The output is indented, YAML-like text. With a schema, fields are named
//! and scalars go through their schema renderers. Without one the walk
//! follows value tags only: object fields are shown as `#1`, `#2`, ... and
//! byte strings that are not printable text are shown as `!hex`.

use std::fmt::Write as _;

use crate::error::{AdbError, Result};
use crate::schema::{Kind, ObjSchema};
use crate::val::{FIRST, Val, ValType};
use crate::view::{DbView, MAX_DEPTH, Obj};

const INDENT: usize = 2;

/// Rendered values allowed per word of the region. Shared subtrees are
/// rendered at every reference, so a small region can fan out without limit.
const NODES_PER_WORD: usize = 64;

/// Render the root of `view`, typed by `schema` if given.
pub fn dump(view: DbView<'_>, schema: Option<ObjSchema>) -> Result<String> {
    let mut d = Dumper::new(view);
    let root = view.root();
    match schema {
        Some(schema) => {
            let obj = view.obj(root, schema)?;
            d.body(&obj, 0, 0)?;
        }
        None => d.untyped_body(view, root, 0, 0)?,
    }
    Ok(d.out)
}

/// Render the fields or items of `obj`, one per line.
pub fn render_obj(obj: &Obj<'_>) -> Result<String> {
    let mut d = Dumper::new(obj.view());
    d.body(obj, 0, 0)?;
    Ok(d.out)
}

struct Dumper {
    out: String,
    budget: usize,
}

impl Dumper {
    fn new(view: DbView<'_>) -> Self {
        Self {
            out: String::new(),
            budget: (view.len() / 4 + 1) * NODES_PER_WORD,
        }
    }

    fn visit(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(AdbError::Unsupported("value graph nested too deeply"));
        }
        match self.budget.checked_sub(1) {
            Some(left) => {
                self.budget = left;
                Ok(())
            }
            None => Err(AdbError::Unsupported("value graph too large to render")),
        }
    }

    fn line(&mut self, indent: usize, text: &str) {
        let _ = writeln!(self.out, "{:indent$}{text}", "");
    }

    fn body(&mut self, obj: &Obj<'_>, indent: usize, depth: usize) -> Result<()> {
        let schema = obj.schema();
        for i in FIRST..obj.num() as usize {
            let v = obj.val(i);
            if v.is_null() {
                continue;
            }
            let prefix = match schema {
                ObjSchema::Object(_) => match schema.field_name(i) {
                    Some(name) => format!("{name}:"),
                    None => format!("#{i}:"),
                },
                ObjSchema::Array(_) => "-".to_string(),
            };
            self.entry(indent, &prefix, obj.view(), schema.child(i), v, depth + 1)?;
        }
        Ok(())
    }

    fn entry(
        &mut self,
        indent: usize,
        prefix: &str,
        view: DbView<'_>,
        kind: Option<Kind>,
        v: Val,
        depth: usize,
    ) -> Result<()> {
        self.visit(depth)?;
        match kind {
            Some(Kind::Scalar(s)) => {
                let text = (s.to_text)(view, v)?;
                self.scalar(indent, prefix, &text, s.multiline);
            }
            Some(Kind::Object(s)) if s.to_text.is_some() => {
                let text = view.obj(v, s)?.to_text()?;
                self.scalar(indent, prefix, &text, false);
            }
            Some(Kind::Object(s)) => self.nested(indent, prefix, &view.obj(v, s)?, depth)?,
            Some(Kind::Array(s)) => self.nested(indent, prefix, &view.obj(v, s)?, depth)?,
            Some(Kind::Adb(s)) => {
                let inner = view.nested(v)?;
                self.nested(indent, prefix, &inner.root_object(s.root)?, depth)?;
            }
            None => self.untyped(indent, prefix, view, v, depth)?,
        }
        Ok(())
    }

    fn nested(&mut self, indent: usize, prefix: &str, obj: &Obj<'_>, depth: usize) -> Result<()> {
        if obj.is_empty() {
            let empty = match obj.schema() {
                ObjSchema::Object(_) => "{}",
                ObjSchema::Array(_) => "[]",
            };
            self.line(indent, &format!("{prefix} {empty}"));
            return Ok(());
        }
        self.line(indent, prefix);
        self.body(obj, indent + INDENT, depth)
    }

    fn scalar(&mut self, indent: usize, prefix: &str, text: &str, multiline: bool) {
        if multiline && text.contains('\n') {
            self.line(indent, &format!("{prefix} |"));
            for l in text.lines() {
                self.line(indent + INDENT, l);
            }
        } else if text.is_empty() || text.contains('\n') {
            self.line(indent, &format!("{prefix} {text:?}"));
        } else {
            self.line(indent, &format!("{prefix} {text}"));
        }
    }

    fn untyped(
        &mut self,
        indent: usize,
        prefix: &str,
        view: DbView<'_>,
        v: Val,
        depth: usize,
    ) -> Result<()> {
        self.visit(depth)?;
        let text = match v.ty() {
            ValType::Special => match v {
                Val::NULL => "null".to_string(),
                Val::TRUE => "true".to_string(),
                Val::FALSE => "false".to_string(),
                _ => format!("special({})", v.payload()),
            },
            ValType::Int | ValType::Int32 | ValType::Int64 => view.int(v)?.to_string(),
            ValType::Blob8 | ValType::Blob16 | ValType::Blob32 => blob_text(view.blob(v)?),
            ValType::Object | ValType::Array => {
                if view.slots(v)?.len() == 4 {
                    let empty = if v.ty() == ValType::Object { "{}" } else { "[]" };
                    self.line(indent, &format!("{prefix} {empty}"));
                } else {
                    self.line(indent, prefix);
                    self.untyped_body(view, v, indent + INDENT, depth)?;
                }
                return Ok(());
            }
            ValType::Error => format!("error({})", v.payload()),
            ValType::Reserved(tag) => format!("reserved({tag:#x}, {:#x})", v.payload()),
        };
        self.line(indent, &format!("{prefix} {text}"));
        Ok(())
    }

    fn untyped_body(&mut self, view: DbView<'_>, v: Val, indent: usize, depth: usize) -> Result<()> {
        let is_object = match v.ty() {
            ValType::Object => true,
            ValType::Array => false,
            _ => return self.untyped(indent, "-", view, v, depth + 1),
        };
        let slots = view.slots(v)?;
        for (i, word) in slots.chunks_exact(4).enumerate().skip(FIRST) {
            let item = Val::from_le_bytes([word[0], word[1], word[2], word[3]]);
            if is_object && item.is_null() {
                continue;
            }
            let prefix = if is_object {
                format!("#{i}:")
            } else {
                "-".to_string()
            };
            self.untyped(indent, &prefix, view, item, depth + 1)?;
        }
        Ok(())
    }
}

/// Printable ASCII is shown as text, anything else as hex.
fn blob_text(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "\"\"".to_string()
    } else if bytes.iter().all(|&c| c.is_ascii_graphic() || c == b' ' || c == b'\t') {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("!hex {}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, ObjWriter};
    use crate::schema::{ArraySchema, BLOB, Field, HEXBLOB, INT, ObjectSchema, TEXT};

    static DEPENDS: ArraySchema = ArraySchema::new(Kind::Scalar(&BLOB));
    static PKG: ObjectSchema = ObjectSchema::new(&[
        Field::new("name", Kind::Scalar(&BLOB)),
        Field::new("size", Kind::Scalar(&INT)),
        Field::new("description", Kind::Scalar(&TEXT)),
        Field::new("checksum", Kind::Scalar(&HEXBLOB)),
        Field::new("depends", Kind::Array(&DEPENDS)),
    ]);

    fn package(b: &mut Builder) -> Val {
        let mut deps = ObjWriter::new(&DEPENDS);
        deps.append_from_str(b, "musl").unwrap();
        deps.append_from_str(b, "so:libz.so.1").unwrap();
        let mut w = ObjWriter::new(&PKG);
        w.set_blob(b, 1, b"curl").unwrap();
        w.set_int(b, 2, 321).unwrap();
        w.set_blob(b, 3, b"URL retrieval\nutility").unwrap();
        w.set_blob(b, 4, &[0xde, 0xad]).unwrap();
        w.set_obj(b, 5, &mut deps).unwrap();
        b.set_root_obj(&mut w).unwrap()
    }

    #[test]
    fn schema_driven() {
        let mut b = Builder::new(1);
        package(&mut b);
        let text = dump(b.view(), Some(ObjSchema::from(&PKG))).unwrap();
        let expected = "\
name: curl
size: 321
description: |
  URL retrieval
  utility
checksum: dead
depends:
  - musl
  - so:libz.so.1
";
        assert_eq!(text, expected);
    }

    #[test]
    fn skips_absent_fields() {
        let mut b = Builder::new(1);
        let mut w = ObjWriter::new(&PKG);
        w.set_blob(&mut b, 1, b"tiny").unwrap();
        let v = b.write_obj(&mut w).unwrap();
        let obj = b.view().obj(v, &PKG).unwrap();
        assert_eq!(obj.to_text().unwrap(), "name: tiny\n");
    }

    #[test]
    fn schemaless() {
        let mut b = Builder::new(1);
        package(&mut b);
        let text = dump(b.view(), None).unwrap();
        let expected = "\
#1: curl
#2: 321
#3: !hex 55524c2072657472696576616c0a7574696c697479
#4: !hex dead
#5:
  - musl
  - so:libz.so.1
";
        assert_eq!(text, expected);
    }

    #[test]
    fn shared_subtrees_are_bounded() {
        fn chain(levels: usize) -> Builder {
            let mut b = Builder::new(1);
            let mut prev = b.write_blob(b"leaf").unwrap();
            let mut w = ObjWriter::new(&DEPENDS);
            for _ in 0..levels {
                w.append(prev).unwrap();
                w.append(prev).unwrap();
                prev = b.write_obj(&mut w).unwrap();
            }
            b.set_root(prev).unwrap();
            b
        }

        let small = dump(chain(8).view(), None).unwrap();
        assert_eq!(small.matches("leaf").count(), 256);
        assert!(matches!(
            dump(chain(48).view(), None),
            Err(AdbError::Unsupported(_))
        ));
    }

    #[test]
    fn binary_blobs_are_hex() {
        assert_eq!(blob_text(b"so:libz.so.1"), "so:libz.so.1");
        assert_eq!(blob_text("caf\u{e9}".as_bytes()), "!hex 636166c3a9");
        assert_eq!(blob_text(&[0xde, 0xad]), "!hex dead");
    }

    #[test]
    fn garbage_root_is_an_error() {
        let buf = Val::new(ValType::Object, 0x100).to_le_bytes();
        assert!(dump(DbView::new(&buf), None).is_err());
        assert!(dump(DbView::new(&buf), Some(ObjSchema::from(&PKG))).is_err());
    }

    #[test]
    fn scalar_root() {
        let buf = Val::TRUE.to_le_bytes();
        assert_eq!(dump(DbView::new(&buf), None).unwrap(), "- true\n");
    }
}
