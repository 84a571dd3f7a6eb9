//! Keygen command

use std::fs;
use std::path::Path;

use adb_format::PrivateKey;
use anyhow::{Context, Result, bail};
use rand::RngCore;

/// Generate a key pair and write `<name>.key` and `<name>.pub` into `output_dir`.
pub fn keygen(name: &str, output_dir: &Path, force: bool) -> Result<()> {
    let key_path = output_dir.join(format!("{name}.key"));
    let pub_path = output_dir.join(format!("{name}.pub"));
    let existing = [&key_path, &pub_path]
        .into_iter()
        .find(|p| !force && p.exists());
    if let Some(existing) = existing {
        bail!("{} already exists (use --force to replace it)", existing.display());
    }

    println!("  generating ed25519 keypair");

    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    let key = PrivateKey::from_bytes(&secret);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    write_secret(&key_path, &key.to_base64())?;
    fs::write(&pub_path, format!("{}\n", key.public().to_base64()))
        .with_context(|| format!("Failed to write {}", pub_path.display()))?;

    println!("  key id  {}", key.id());
    println!("  wrote {}", key_path.display());
    println!("  wrote {}", pub_path.display());
    Ok(())
}

#[cfg(unix)]
fn write_secret(path: &Path, text: &str) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(f, "{text}")?;
    Ok(())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, text: &str) -> Result<()> {
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adb_format::PublicKey;

    #[test]
    fn writes_matching_pair() {
        let dir = tempfile::tempdir().unwrap();
        keygen("release", dir.path(), false).unwrap();
        let private = PrivateKey::load(&dir.path().join("release.key")).unwrap();
        let public = PublicKey::load(&dir.path().join("release.pub")).unwrap();
        assert_eq!(private.id(), public.id());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        keygen("adb", dir.path(), false).unwrap();
        let before = fs::read(dir.path().join("adb.key")).unwrap();
        assert!(keygen("adb", dir.path(), false).is_err());
        assert_eq!(fs::read(dir.path().join("adb.key")).unwrap(), before);

        keygen("adb", dir.path(), true).unwrap();
        assert_ne!(fs::read(dir.path().join("adb.key")).unwrap(), before);
    }
}
