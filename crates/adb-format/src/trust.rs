//! Signing keys, signature blocks and trust policy.
//!
//! A container is signed by appending one Sig block per private key after
//! its Adb block. Each Sig block carries a small record:
//!
//! ```text
//! version u8 | hash alg u8 | key id [16] | signature ...
//! ```
//!
//! The signature covers `file header | version | hash alg | digest(adb payload)`.
//! Keys are Ed25519; a key id is the first 16 bytes of the SHA-512 of the raw
//! public key. Verification digests are computed at most once per algorithm
//! per pass through a [`VerifyCtx`].

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};

use crate::block::{BlockType, Header, write_block};
use crate::error::{AdbError, Result, TrustError};

/// Length of a key identifier.
pub const KEY_ID_LEN: usize = 16;

/// The only signature record version in use.
pub const SIGNATURE_VERSION: u8 = 0;

const RECORD_HEADER_LEN: usize = 2 + KEY_ID_LEN;

/// Identifier of a key: a truncated SHA-512 of the public key bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    /// Wrap raw id bytes.
    pub const fn from_bytes(bytes: [u8; KEY_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Id of a raw Ed25519 public key.
    pub fn of(public: &[u8]) -> Self {
        let digest = Sha512::digest(public);
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        Self(id)
    }

    /// The raw id bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

impl FromStr for KeyId {
    type Err = AdbError;

    fn from_str(s: &str) -> Result<Self> {
        let parse_err = || AdbError::ParseText {
            kind: "key id",
            input: s.to_string(),
        };
        let bytes = hex::decode(s.trim()).map_err(|_| parse_err())?;
        let bytes: [u8; KEY_ID_LEN] = bytes.try_into().map_err(|_| parse_err())?;
        Ok(Self(bytes))
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Digest algorithm named by a signature record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    /// Unsigned or legacy file.
    None,
    /// SHA-1. Recognized but not computed.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512, used for all new signatures.
    Sha512,
    /// Any other id.
    Unknown(u8),
}

impl HashAlg {
    /// Decode the on-disk id.
    pub fn from_u8(id: u8) -> Self {
        match id {
            0 => Self::None,
            1 => Self::Sha1,
            2 => Self::Sha256,
            3 => Self::Sha512,
            other => Self::Unknown(other),
        }
    }

    /// The on-disk id.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Sha1 => 1,
            Self::Sha256 => 2,
            Self::Sha512 => 3,
            Self::Unknown(id) => id,
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Sha1 => f.write_str("sha1"),
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha512 => f.write_str("sha512"),
            Self::Unknown(id) => write!(f, "unknown({id})"),
        }
    }
}

fn decode_key(text: &str) -> Result<[u8; 32], String> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 key bytes, found {}", b.len()))
}

fn read_key_file(path: &Path) -> Result<[u8; 32], TrustError> {
    let invalid = |reason: String| TrustError::InvalidKey {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    decode_key(&text).map_err(invalid)
}

/// A verification key.
#[derive(Debug, Clone)]
pub struct PublicKey {
    id: KeyId,
    key: VerifyingKey,
}

impl PublicKey {
    /// Wrap an Ed25519 verifying key.
    pub fn new(key: VerifyingKey) -> Self {
        Self {
            id: KeyId::of(key.as_bytes()),
            key,
        }
    }

    /// Parse Base64 key text; `origin` names the source in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, TrustError> {
        let invalid = |reason: String| TrustError::InvalidKey {
            path: origin.to_path_buf(),
            reason,
        };
        let bytes = decode_key(text).map_err(invalid)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::new(key))
    }

    /// Load a Base64 key file.
    pub fn load(path: &Path) -> Result<Self, TrustError> {
        let bytes = read_key_file(path)?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self::new)
            .map_err(|e| TrustError::InvalidKey {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Key identifier.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// The Ed25519 key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Base64 of the raw key, the on-disk form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key.as_bytes())
    }
}

/// A signing key.
#[derive(Clone)]
pub struct PrivateKey {
    id: KeyId,
    key: SigningKey,
}

impl PrivateKey {
    /// Key from a raw 32-byte secret.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(secret);
        Self {
            id: KeyId::of(key.verifying_key().as_bytes()),
            key,
        }
    }

    /// Parse Base64 key text; `origin` names the source in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, TrustError> {
        decode_key(text)
            .map(|secret| Self::from_bytes(&secret))
            .map_err(|reason| TrustError::InvalidKey {
                path: origin.to_path_buf(),
                reason,
            })
    }

    /// Load a Base64 key file.
    pub fn load(path: &Path) -> Result<Self, TrustError> {
        read_key_file(path).map(|secret| Self::from_bytes(&secret))
    }

    /// Key identifier of the matching public key.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// The matching verification key.
    pub fn public(&self) -> PublicKey {
        PublicKey::new(self.key.verifying_key())
    }

    /// Base64 of the raw secret, the on-disk form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key.to_bytes())
    }

    fn sign(&self, msg: &[u8]) -> Signature {
        self.key.sign(msg)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Digests of the data block, computed lazily and at most once per algorithm.
#[derive(Debug, Clone, Default)]
pub struct VerifyCtx {
    sha256: Option<[u8; 32]>,
    sha512: Option<[u8; 64]>,
}

impl VerifyCtx {
    /// Empty context for one verification or signing pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of `data` under `alg`, reusing an earlier result.
    ///
    /// `data` may be `None` once the digest has been computed or stored.
    pub fn digest(
        &mut self,
        alg: HashAlg,
        data: Option<&[u8]>,
    ) -> Result<&[u8], TrustError> {
        match alg {
            HashAlg::Sha256 => {
                if self.sha256.is_none() {
                    let data = data.ok_or(TrustError::MissingData)?;
                    let mut out = [0u8; 32];
                    out.copy_from_slice(&Sha256::digest(data));
                    self.sha256 = Some(out);
                }
                self.sha256
                    .as_ref()
                    .map(|d| &d[..])
                    .ok_or(TrustError::MissingData)
            }
            HashAlg::Sha512 => {
                if self.sha512.is_none() {
                    let data = data.ok_or(TrustError::MissingData)?;
                    let mut out = [0u8; 64];
                    out.copy_from_slice(&Sha512::digest(data));
                    self.sha512 = Some(out);
                }
                self.sha512
                    .as_ref()
                    .map(|d| &d[..])
                    .ok_or(TrustError::MissingData)
            }
            other => Err(TrustError::UnsupportedHash(other)),
        }
    }

    /// Record a digest computed elsewhere, e.g. while streaming.
    pub fn store(&mut self, alg: HashAlg, digest: &[u8]) -> Result<(), TrustError> {
        match alg {
            HashAlg::Sha256 => {
                let d = digest.try_into().map_err(|_| TrustError::MissingData)?;
                self.sha256 = Some(d);
            }
            HashAlg::Sha512 => {
                let d = digest.try_into().map_err(|_| TrustError::MissingData)?;
                self.sha512 = Some(d);
            }
            other => return Err(TrustError::UnsupportedHash(other)),
        }
        Ok(())
    }

    /// True if any digest is available.
    pub fn has_digest(&self) -> bool {
        self.sha256.is_some() || self.sha512.is_some()
    }
}

/// Decoded payload of a Sig block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Record layout version.
    pub version: u8,
    /// Digest the signature covers.
    pub hash_alg: HashAlg,
    /// Signing key.
    pub key_id: KeyId,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

impl SignatureRecord {
    /// Split a Sig block payload into its fields.
    pub fn parse(payload: &[u8]) -> Result<Self, TrustError> {
        if payload.len() < RECORD_HEADER_LEN {
            return Err(TrustError::MalformedSignature);
        }
        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(&payload[2..RECORD_HEADER_LEN]);
        Ok(Self {
            version: payload[0],
            hash_alg: HashAlg::from_u8(payload[1]),
            key_id: KeyId(key_id),
            signature: payload[RECORD_HEADER_LEN..].to_vec(),
        })
    }

    /// Encode as a Sig block payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + self.signature.len());
        out.push(self.version);
        out.push(self.hash_alg.to_u8());
        out.extend_from_slice(&self.key_id.0);
        out.extend_from_slice(&self.signature);
        out
    }
}

fn signed_message(header: Header, version: u8, alg: HashAlg, digest: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(10 + digest.len());
    msg.extend_from_slice(&header.to_bytes());
    msg.push(version);
    msg.push(alg.to_u8());
    msg.extend_from_slice(digest);
    msg
}

/// Outcome of checking one Sig block.
#[derive(Debug, Clone)]
pub struct SignatureReport {
    /// Signing key, if the record could be parsed.
    pub key_id: Option<KeyId>,
    /// Digest algorithm, if the record could be parsed.
    pub hash_alg: Option<HashAlg>,
    /// Whether the signature verified, and why not.
    pub outcome: Result<(), TrustError>,
}

impl SignatureReport {
    /// True if the signature verified against a trusted key.
    pub fn is_verified(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Which signatures a file needs to be accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustPolicy {
    /// At least one signature verifies against a trusted key.
    #[default]
    Any,
    /// Every present signature verifies, and there is at least one.
    All,
    /// Each listed key has a verifying signature.
    Require(Vec<KeyId>),
}

impl TrustPolicy {
    /// Apply the policy to the per-signature outcomes of one file.
    pub fn evaluate(&self, reports: &[SignatureReport]) -> Result<(), TrustError> {
        let any_ok = reports.iter().any(SignatureReport::is_verified);
        match self {
            TrustPolicy::Any => {
                if any_ok {
                    Ok(())
                } else {
                    Err(TrustError::Untrusted)
                }
            }
            TrustPolicy::All => match reports.iter().find_map(|r| r.outcome.as_ref().err()) {
                Some(err) => Err(err.clone()),
                None if reports.is_empty() => Err(TrustError::Untrusted),
                None => Ok(()),
            },
            TrustPolicy::Require(ids) => {
                for id in ids {
                    let signed = reports
                        .iter()
                        .any(|r| r.key_id == Some(*id) && r.is_verified());
                    if !signed {
                        return Err(TrustError::MissingRequiredKey(*id));
                    }
                }
                if any_ok {
                    Ok(())
                } else {
                    Err(TrustError::Untrusted)
                }
            }
        }
    }
}

/// Trusted verification keys, signing keys and the acceptance policy.
#[derive(Debug, Clone, Default)]
pub struct Trust {
    trusted: Vec<PublicKey>,
    private: Vec<PrivateKey>,
    policy: TrustPolicy,
}

impl Trust {
    /// No keys, policy [`TrustPolicy::Any`].
    pub fn new() -> Self {
        Self::default()
    }

    /// No keys, the given policy.
    pub fn with_policy(policy: TrustPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Load every readable key in `keys_dir` as trusted, plus the given
    /// private key files.
    pub fn load(keys_dir: Option<&Path>, private_keys: &[PathBuf]) -> Result<Self> {
        let mut trust = Self::new();
        if let Some(dir) = keys_dir {
            trust.load_dir(dir)?;
        }
        for path in private_keys {
            trust.add_private(PrivateKey::load(path)?);
        }
        Ok(trust)
    }

    /// Add every parseable key file in `dir` to the trusted set.
    ///
    /// Files that are not valid keys are skipped with a warning. Returns the
    /// number of keys added.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            match PublicKey::load(&path) {
                Ok(key) => {
                    debug!(key = %key.id(), path = %path.display(), "loaded trusted key");
                    self.add_trusted(key);
                    added += 1;
                }
                Err(e) => warn!(error = %e, "skipping key file"),
            }
        }
        Ok(added)
    }

    /// Trust a verification key.
    pub fn add_trusted(&mut self, key: PublicKey) {
        if self.find_trusted(&key.id()).is_none() {
            self.trusted.push(key);
        }
    }

    /// Add a signing key.
    pub fn add_private(&mut self, key: PrivateKey) {
        debug!(key = %key.id(), "loaded signing key");
        self.private.push(key);
    }

    /// Acceptance policy.
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Replace the acceptance policy.
    pub fn set_policy(&mut self, policy: TrustPolicy) {
        self.policy = policy;
    }

    /// Trusted verification keys.
    pub fn trusted(&self) -> &[PublicKey] {
        &self.trusted
    }

    /// Signing keys.
    pub fn private_keys(&self) -> &[PrivateKey] {
        &self.private
    }

    /// Trusted key with the given id.
    pub fn find_trusted(&self, id: &KeyId) -> Option<&PublicKey> {
        self.trusted.iter().find(|k| k.id == *id)
    }

    /// Verify one decoded signature record over the Adb payload `adb`.
    pub fn verify_record(
        &self,
        header: Header,
        adb: Option<&[u8]>,
        vfy: &mut VerifyCtx,
        record: &SignatureRecord,
    ) -> Result<(), TrustError> {
        if record.version != SIGNATURE_VERSION {
            return Err(TrustError::UnsupportedVersion(record.version));
        }
        if !matches!(record.hash_alg, HashAlg::Sha256 | HashAlg::Sha512) {
            return Err(TrustError::UnsupportedHash(record.hash_alg));
        }
        let key = self
            .find_trusted(&record.key_id)
            .ok_or(TrustError::UnknownKey(record.key_id))?;
        let signature =
            Signature::from_slice(&record.signature).map_err(|_| TrustError::MalformedSignature)?;
        let digest = vfy.digest(record.hash_alg, adb)?;
        let msg = signed_message(header, record.version, record.hash_alg, digest);
        key.key
            .verify(&msg, &signature)
            .map_err(|_| TrustError::SignatureMismatch(record.key_id))
    }

    /// Check a Sig block payload and describe the outcome.
    pub fn verify_signature(
        &self,
        header: Header,
        adb: Option<&[u8]>,
        vfy: &mut VerifyCtx,
        payload: &[u8],
    ) -> SignatureReport {
        let report = match SignatureRecord::parse(payload) {
            Ok(record) => SignatureReport {
                key_id: Some(record.key_id),
                hash_alg: Some(record.hash_alg),
                outcome: self.verify_record(header, adb, vfy, &record),
            },
            Err(e) => SignatureReport {
                key_id: None,
                hash_alg: None,
                outcome: Err(e),
            },
        };
        match &report.outcome {
            Ok(()) => debug!(key = ?report.key_id, "signature verified"),
            Err(e) => warn!(key = ?report.key_id, error = %e, "signature rejected"),
        }
        report
    }

    /// Write one SHA-512 Sig block per signing key. Returns how many.
    pub fn write_signatures<W: Write + ?Sized>(
        &self,
        os: &mut W,
        header: Header,
        adb: Option<&[u8]>,
        vfy: &mut VerifyCtx,
    ) -> Result<usize> {
        for key in &self.private {
            let digest = vfy.digest(HashAlg::Sha512, adb)?;
            let msg = signed_message(header, SIGNATURE_VERSION, HashAlg::Sha512, digest);
            let record = SignatureRecord {
                version: SIGNATURE_VERSION,
                hash_alg: HashAlg::Sha512,
                key_id: key.id,
                signature: key.sign(&msg).to_bytes().to_vec(),
            };
            write_block(os, BlockType::Sig, &record.encode())?;
            debug!(key = %key.id, "wrote signature");
        }
        Ok(self.private.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Blocks, HEADER_LEN};

    fn key(n: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[n; 32])
    }

    fn trusting(keys: &[&PrivateKey]) -> Trust {
        let mut trust = Trust::new();
        for k in keys {
            trust.add_trusted(k.public());
        }
        trust
    }

    fn signed_by(signer: &PrivateKey, header: Header, adb: &[u8]) -> Vec<u8> {
        let mut trust = Trust::new();
        trust.add_private(signer.clone());
        let mut out = Vec::new();
        trust
            .write_signatures(&mut out, header, Some(adb), &mut VerifyCtx::new())
            .unwrap();
        let block = Blocks::new(&out).next().unwrap().unwrap();
        assert_eq!(block.header.ty, BlockType::Sig);
        block.payload.to_vec()
    }

    #[test]
    fn key_id_is_truncated_sha512() {
        let k = key(1);
        let public = k.public();
        assert_eq!(k.id(), public.id());
        let digest = Sha512::digest(public.verifying_key().as_bytes());
        assert_eq!(&k.id().as_bytes()[..], &digest[..KEY_ID_LEN]);
        assert_ne!(key(2).id(), k.id());
    }

    #[test]
    fn key_id_text_round_trip() {
        let id = key(3).id();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<KeyId>().unwrap(), id);
        assert!("abcd".parse::<KeyId>().is_err());
    }

    #[test]
    fn record_layout() {
        let header = Header::new(7);
        let sig = signed_by(&key(1), header, b"payload");
        assert_eq!(sig.len(), RECORD_HEADER_LEN + 64);
        assert_eq!(sig[0], SIGNATURE_VERSION);
        assert_eq!(sig[1], 3);
        let record = SignatureRecord::parse(&sig).unwrap();
        assert_eq!(record.key_id, key(1).id());
        assert_eq!(record.encode(), sig);
        assert!(matches!(
            SignatureRecord::parse(&sig[..10]),
            Err(TrustError::MalformedSignature)
        ));
    }

    #[test]
    fn sign_then_verify() {
        let header = Header::new(7);
        let signer = key(1);
        let sig = signed_by(&signer, header, b"payload");
        let trust = trusting(&[&signer]);
        let report = trust.verify_signature(header, Some(b"payload"), &mut VerifyCtx::new(), &sig);
        assert!(report.is_verified());
        assert_eq!(report.key_id, Some(signer.id()));
        assert_eq!(report.hash_alg, Some(HashAlg::Sha512));
    }

    #[test]
    fn tampering_is_detected() {
        let header = Header::new(7);
        let signer = key(1);
        let sig = signed_by(&signer, header, b"payload");
        let trust = trusting(&[&signer]);

        let r = trust.verify_signature(header, Some(b"payloae"), &mut VerifyCtx::new(), &sig);
        assert!(matches!(r.outcome, Err(TrustError::SignatureMismatch(_))));

        let mut flipped = sig.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0x01;
        let r = trust.verify_signature(header, Some(b"payload"), &mut VerifyCtx::new(), &flipped);
        assert!(!r.is_verified());

        // The header is covered too.
        let r = trust.verify_signature(Header::new(8), Some(b"payload"), &mut VerifyCtx::new(), &sig);
        assert!(matches!(r.outcome, Err(TrustError::SignatureMismatch(_))));
    }

    #[test]
    fn unrelated_key_is_unknown() {
        let header = Header::new(7);
        let sig = signed_by(&key(1), header, b"payload");
        let trust = trusting(&[&key(2)]);
        let r = trust.verify_signature(header, Some(b"payload"), &mut VerifyCtx::new(), &sig);
        assert!(matches!(r.outcome, Err(TrustError::UnknownKey(id)) if id == key(1).id()));
    }

    #[test]
    fn unsupported_algorithms_and_versions() {
        let header = Header::new(7);
        let mut sig = signed_by(&key(1), header, b"payload");
        let trust = trusting(&[&key(1)]);
        sig[1] = 1;
        let r = trust.verify_signature(header, Some(b"payload"), &mut VerifyCtx::new(), &sig);
        assert!(matches!(r.outcome, Err(TrustError::UnsupportedHash(HashAlg::Sha1))));
        sig[1] = 3;
        sig[0] = 9;
        let r = trust.verify_signature(header, Some(b"payload"), &mut VerifyCtx::new(), &sig);
        assert!(matches!(r.outcome, Err(TrustError::UnsupportedVersion(9))));
    }

    #[test]
    fn digest_is_cached() {
        let mut vfy = VerifyCtx::new();
        assert!(matches!(
            vfy.digest(HashAlg::Sha512, None),
            Err(TrustError::MissingData)
        ));
        let first = vfy.digest(HashAlg::Sha512, Some(b"abc")).unwrap().to_vec();
        assert_eq!(first.len(), 64);
        assert_eq!(vfy.digest(HashAlg::Sha512, None).unwrap(), &first[..]);
        assert_eq!(vfy.digest(HashAlg::Sha256, Some(b"abc")).unwrap().len(), 32);
        assert!(matches!(
            vfy.digest(HashAlg::Sha1, Some(b"abc")),
            Err(TrustError::UnsupportedHash(HashAlg::Sha1))
        ));
    }

    fn report(id: KeyId, ok: bool) -> SignatureReport {
        SignatureReport {
            key_id: Some(id),
            hash_alg: Some(HashAlg::Sha512),
            outcome: if ok {
                Ok(())
            } else {
                Err(TrustError::UnknownKey(id))
            },
        }
    }

    #[test]
    fn policies() {
        let (a, b) = (key(1).id(), key(2).id());
        let mixed = [report(a, true), report(b, false)];
        let good = [report(a, true), report(b, true)];

        assert!(TrustPolicy::Any.evaluate(&mixed).is_ok());
        assert!(matches!(TrustPolicy::Any.evaluate(&[]), Err(TrustError::Untrusted)));

        assert!(matches!(
            TrustPolicy::All.evaluate(&mixed),
            Err(TrustError::UnknownKey(_))
        ));
        assert!(TrustPolicy::All.evaluate(&good).is_ok());
        assert!(TrustPolicy::All.evaluate(&[]).is_err());

        let require_b = TrustPolicy::Require(vec![b]);
        assert!(matches!(
            require_b.evaluate(&mixed),
            Err(TrustError::MissingRequiredKey(id)) if id == b
        ));
        assert!(require_b.evaluate(&good).is_ok());
    }

    #[test]
    fn policy_from_toml() {
        #[derive(Deserialize)]
        struct Config {
            policy: TrustPolicy,
        }
        let any: Config = toml::from_str(r#"policy = "any""#).unwrap();
        assert_eq!(any.policy, TrustPolicy::Any);
        let id = key(1).id();
        let text = format!("[policy]\nrequire = [\"{id}\"]\n");
        let req: Config = toml::from_str(&text).unwrap();
        assert_eq!(req.policy, TrustPolicy::Require(vec![id]));
    }

    #[test]
    fn load_dir_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pub"), key(1).public().to_base64()).unwrap();
        fs::write(dir.path().join("b.pub"), format!("{}\n", key(2).public().to_base64())).unwrap();
        fs::write(dir.path().join("junk.pub"), "not a key").unwrap();
        fs::write(dir.path().join("short.pub"), STANDARD.encode([1u8; 8])).unwrap();

        let mut trust = Trust::new();
        assert_eq!(trust.load_dir(dir.path()).unwrap(), 2);
        assert!(trust.find_trusted(&key(1).id()).is_some());
        assert!(trust.find_trusted(&key(2).id()).is_some());
    }

    #[test]
    fn private_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        fs::write(&path, key(5).to_base64()).unwrap();
        let trust = Trust::load(None, std::slice::from_ref(&path)).unwrap();
        assert_eq!(trust.private_keys()[0].id(), key(5).id());

        let bad = dir.path().join("bad.key");
        fs::write(&bad, "!!").unwrap();
        let err = Trust::load(None, &[bad]).unwrap_err();
        assert!(matches!(err, AdbError::Trust(TrustError::InvalidKey { .. })));
        assert!(format!("{:?}", key(5)).contains(&key(5).id().to_string()));
    }

    #[test]
    fn message_layout() {
        let msg = signed_message(Header::new(1), 0, HashAlg::Sha512, &[0xaa; 64]);
        assert_eq!(msg.len(), HEADER_LEN + 2 + 64);
        assert_eq!(&msg[..4], b"ADB.");
        assert_eq!(msg[9], 3);
    }
}
