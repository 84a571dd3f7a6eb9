//! Integration tests.

use adb_format::block::{BLOCK_HEADER_LEN, BlockType, Blocks, HEADER_LEN};
use adb_format::schema::{
    AdbSchema, ArraySchema, BLOB, Field, FieldDefault, INT, Kind, ObjectSchema,
};
use adb_format::dump::dump;
use adb_format::{
    AdbError, Builder, Db, ObjSchema, ObjWriter, PrivateKey, Resign, StripSignatures, Transform, Trust,
    TrustError, TrustPolicy,
};

const SCHEMA_ID: u32 = 0x6b67_6b70;

static FILES: ArraySchema = ArraySchema::new(Kind::Scalar(&BLOB));
static PACKAGE: ObjectSchema = ObjectSchema::new(&[
    Field::new("name", Kind::Scalar(&BLOB)),
    Field::new("version", Kind::Scalar(&BLOB)),
    Field::new("size", Kind::Scalar(&INT)),
    Field::new("files", Kind::Array(&FILES)),
]);
static PACKAGE_FILE: AdbSchema = AdbSchema::new(SCHEMA_ID, &PACKAGE);

// A later revision of the same layout with one more field.
static PACKAGE_V2: ObjectSchema = ObjectSchema::new(&[
    Field::new("name", Kind::Scalar(&BLOB)),
    Field::new("version", Kind::Scalar(&BLOB)),
    Field::new("size", Kind::Scalar(&INT)),
    Field::new("files", Kind::Array(&FILES)),
    Field::new("priority", Kind::Scalar(&INT)).with_default(FieldDefault::Int(100)),
]);
static PACKAGE_V2_FILE: AdbSchema = AdbSchema::new(SCHEMA_ID, &PACKAGE_V2);

const PATHS: [&str; 5] = [
    "usr/bin/zstd",
    "usr/share/licenses/zstd/COPYING",
    "usr/lib/libzstd.so.1",
    "usr/share/licenses/libzstd/COPYING",
    "usr/share/man/man1/zstd.1",
];

fn key(n: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[n; 32])
}

fn verifier(n: u8) -> Trust {
    let mut trust = Trust::new();
    trust.add_trusted(key(n).public());
    trust
}

fn signer(n: u8) -> Trust {
    let mut trust = Trust::new();
    trust.add_private(key(n));
    trust
}

const LICENSE: &[u8] = b"BSD License\n\nRedistribution and use in source and binary forms...";

/// Root object with three scalars and five file entries. Entry 2 carries
/// the license text and entry 4 carries `second_license`.
fn package(second_license: &[u8]) -> Builder {
    let mut b = Builder::new(SCHEMA_ID);
    let mut files = ObjWriter::new(&FILES);
    for (i, path) in PATHS.iter().enumerate() {
        let content = match i {
            1 => LICENSE,
            3 => second_license,
            _ => path.as_bytes(),
        };
        files.append(b.write_blob(content).unwrap()).unwrap();
    }
    let mut root = ObjWriter::new(&PACKAGE);
    root.set_blob(&mut b, 1, b"zstd").unwrap();
    root.set_blob(&mut b, 2, b"1.5.6-r0").unwrap();
    root.set_int(&mut b, 3, 1_349_632).unwrap();
    root.set_obj(&mut b, 4, &mut files).unwrap();
    b.set_root_obj(&mut root).unwrap();
    b
}

fn sig_payload_offset(bytes: &[u8]) -> usize {
    Blocks::new(&bytes[HEADER_LEN..])
        .map(Result::unwrap)
        .find(|b| b.header.ty == BlockType::Sig)
        .map(|b| HEADER_LEN + b.offset + BLOCK_HEADER_LEN)
        .unwrap()
}

#[test]
fn signed_package_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zstd.adb");
    package(LICENSE).write_file(&path, Some(&signer(1))).unwrap();

    let db = Db::open(&path, Some(SCHEMA_ID), Some(&verifier(1))).unwrap();
    assert_eq!(db.signatures().len(), 1);
    assert_eq!(db.signatures()[0].key_id, Some(key(1).id()));

    let root = db.root_object(&PACKAGE_FILE).unwrap();
    assert_eq!(root.blob(1).unwrap(), b"zstd");
    assert_eq!(root.blob(2).unwrap(), b"1.5.6-r0");
    assert_eq!(root.int(3).unwrap(), 1_349_632);

    let files = root.obj(4).unwrap();
    assert_eq!(files.len(), 5);
    assert_eq!(files.blob(1).unwrap(), b"usr/bin/zstd");
    assert_eq!(files.blob(2).unwrap(), files.blob(4).unwrap());
    // Identical content shares one offset; distinct content does not.
    assert_eq!(files.val(2), files.val(4));
    assert_ne!(files.val(1), files.val(3));
    assert_ne!(files.val(2), files.val(5));
}

#[test]
fn unrelated_key_is_a_trust_error() {
    let bytes = package(LICENSE).to_bytes(Some(&signer(1))).unwrap();
    let err = Db::from_bytes(bytes, Some(SCHEMA_ID), Some(&verifier(2))).unwrap_err();
    assert!(matches!(err, AdbError::Trust(TrustError::Untrusted)));
}

#[test]
fn any_flipped_bit_breaks_the_signature() {
    let bytes = package(LICENSE).to_bytes(Some(&signer(1))).unwrap();
    let db = Db::from_bytes(bytes.clone(), None, None).unwrap();
    let payload = db.adb_range();
    let sig = sig_payload_offset(&bytes);

    // First payload byte, root word, key id, signature body.
    for at in [payload.start, payload.end - 1, sig + 2, sig + 40] {
        let mut tampered = bytes.clone();
        tampered[at] ^= 0x10;
        let result = Db::from_bytes(tampered, None, Some(&verifier(1)));
        assert!(
            matches!(result, Err(AdbError::Trust(_))),
            "flip at {at} was accepted"
        );
    }
    assert!(Db::from_bytes(bytes, None, Some(&verifier(1))).is_ok());
}

#[test]
fn older_objects_read_with_newer_schema() {
    let bytes = package(LICENSE).to_bytes(None).unwrap();
    let db = Db::from_bytes(bytes, Some(SCHEMA_ID), None).unwrap();
    let root = db.root_object(&PACKAGE_V2_FILE).unwrap();
    assert_eq!(root.blob(1).unwrap(), b"zstd");
    assert_eq!(root.int(5).unwrap(), 100);
}

#[test]
fn dedup_saves_space() {
    let shared = package(LICENSE);
    let distinct = package(b"BSD License\n\nRedistribution and use in source and binary forms!!!");
    assert!(shared.stats().hits >= 1);
    assert!(shared.len() < distinct.len());
}

#[test]
fn resign_then_strip() {
    let original = package(LICENSE).to_bytes(Some(&signer(1))).unwrap();

    let trust = signer(2);
    let mut resign = Resign::new(&trust);
    let resigned = Transform::new(original.as_slice(), Vec::<u8>::new())
        .run(&mut resign)
        .unwrap();
    assert_eq!(resign.signed(), 1);
    assert!(Db::from_bytes(resigned.clone(), None, Some(&verifier(1))).is_err());

    let mut strict = verifier(2);
    strict.add_trusted(key(1).public());
    strict.set_policy(TrustPolicy::Require(vec![key(2).id()]));
    let db = Db::from_bytes(resigned.clone(), None, Some(&strict)).unwrap();
    assert_eq!(db.view().data(), Db::from_bytes(original, None, None).unwrap().view().data());

    let mut strip = StripSignatures::new();
    let stripped = Transform::new(resigned.as_slice(), Vec::<u8>::new())
        .run(&mut strip)
        .unwrap();
    assert_eq!(strip.removed(), 1);
    let db = Db::from_bytes(stripped, Some(SCHEMA_ID), None).unwrap();
    assert!(db.is_terminated());
    assert_eq!(db.root_object(&PACKAGE_FILE).unwrap().blob(1).unwrap(), b"zstd");
}

/// Read everything reachable from a possibly corrupt image.
fn exercise(bytes: Vec<u8>, trust: &Trust) {
    let _ = Db::from_bytes(bytes.clone(), None, Some(trust));
    let Ok(db) = Db::from_bytes(bytes, None, None) else {
        return;
    };
    let _ = db.signature_reports(trust);
    let _ = dump(db.view(), None);
    let _ = dump(db.view(), Some(ObjSchema::from(&PACKAGE_V2)));
    if let Ok(root) = db.root_object(&PACKAGE_V2_FILE) {
        let _ = root.blob(1);
        let _ = root.int(5);
        if let Ok(files) = root.obj(4) {
            for i in 1..=files.len() {
                let _ = files.blob(i);
            }
        }
    }
}

#[test]
fn mutated_files_never_panic() {
    let bytes = package(LICENSE).to_bytes(Some(&signer(1))).unwrap();
    let trust = verifier(1);
    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for len in 0..bytes.len() {
        exercise(bytes[..len].to_vec(), &trust);
    }
    for _ in 0..5000 {
        let mut mutated = bytes.clone();
        let flips = 1 + next() % 4;
        for _ in 0..flips {
            let at = usize::try_from(next()).unwrap() % mutated.len();
            mutated[at] = next().to_le_bytes()[0];
        }
        exercise(mutated, &trust);
    }
}
