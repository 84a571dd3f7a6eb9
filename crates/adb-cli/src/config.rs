//! Configuration: `$ADB_HOME/config.toml` merged with flags and environment.

use std::fs;
use std::path::{Path, PathBuf};

use adb_format::{PrivateKey, Trust, TrustPolicy};
use anyhow::{Context, Result};
use dirs::home_dir;
use serde::Deserialize;
use tracing::debug;

use crate::{KeyArgs, PolicyArg};

/// Name of the configuration file inside the home directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Returns the adb home directory (`$ADB_HOME`, else `~/.adb`).
pub fn adb_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("ADB_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".adb"))
}

/// Contents of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of trusted public keys.
    pub keys_dir: Option<PathBuf>,
    /// Private key files to sign with.
    pub private_keys: Vec<PathBuf>,
    /// Acceptance policy.
    pub policy: Option<TrustPolicy>,
}

impl Config {
    /// Parse a configuration file. Relative paths are taken relative to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.keys_dir = config.keys_dir.map(|p| base.join(p));
            for key in &mut config.private_keys {
                *key = base.join(&*key);
            }
        }
        Ok(config)
    }

    /// The explicit file if given, else `$ADB_HOME/config.toml` if present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match adb_home().map(|home| home.join(CONFIG_FILE)) {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Effective settings after layering.
#[derive(Debug)]
pub struct Settings {
    /// Keys and policy.
    pub trust: Trust,
    /// Directory the trusted keys came from, if any.
    pub keys_dir: Option<PathBuf>,
}

impl Settings {
    /// Merge flags and environment over the configuration file.
    pub fn load(args: &KeyArgs) -> Result<Self> {
        let config = Config::discover(args.config.as_deref())?;
        Self::resolve(args, config)
    }

    /// Merge flags over an already loaded configuration.
    pub fn resolve(args: &KeyArgs, config: Config) -> Result<Self> {
        let policy = match args.policy {
            _ if !args.required.is_empty() => TrustPolicy::Require(args.required.clone()),
            Some(PolicyArg::Any) => TrustPolicy::Any,
            Some(PolicyArg::All) => TrustPolicy::All,
            None => config.policy.unwrap_or_default(),
        };
        let mut trust = Trust::with_policy(policy);

        let keys_dir = args.keys_dir.clone().or(config.keys_dir).or_else(|| {
            adb_home()
                .map(|home| home.join("keys"))
                .filter(|dir| dir.is_dir())
        });
        if let Some(dir) = &keys_dir {
            let added = trust
                .load_dir(dir)
                .with_context(|| format!("Failed to read keys from {}", dir.display()))?;
            debug!(dir = %dir.display(), added, "trusted keys loaded");
        }

        for path in args.private_keys.iter().chain(&config.private_keys) {
            let key = PrivateKey::load(path)
                .with_context(|| format!("Failed to load private key {}", path.display()))?;
            trust.add_private(key);
        }
        if let Some(secret) = &args.signing_key {
            let key = PrivateKey::parse(secret, Path::new("ADB_SIGNING_KEY"))
                .context("Invalid ADB_SIGNING_KEY")?;
            trust.add_private(key);
        }

        Ok(Self { trust, keys_dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[n; 32])
    }

    #[test]
    fn config_paths_are_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "keys_dir = \"keys\"\nprivate_keys = [\"release.key\"]\npolicy = \"all\"\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.keys_dir, Some(dir.path().join("keys")));
        assert_eq!(config.private_keys, [dir.path().join("release.key")]);
        assert_eq!(config.policy, Some(TrustPolicy::All));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "key_dir = \"typo\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys");
        fs::create_dir(&keys).unwrap();
        fs::write(keys.join("a.pub"), key(1).public().to_base64()).unwrap();
        let secret = dir.path().join("a.key");
        fs::write(&secret, key(1).to_base64()).unwrap();

        let config = Config {
            keys_dir: Some(keys.clone()),
            private_keys: vec![secret],
            policy: Some(TrustPolicy::All),
        };
        let args = KeyArgs {
            signing_key: Some(key(2).to_base64()),
            required: vec![key(1).id()],
            ..KeyArgs::default()
        };
        let settings = Settings::resolve(&args, config).unwrap();
        assert_eq!(settings.keys_dir, Some(keys));
        assert_eq!(settings.trust.trusted().len(), 1);
        assert_eq!(settings.trust.private_keys().len(), 2);
        assert_eq!(
            settings.trust.policy(),
            &TrustPolicy::Require(vec![key(1).id()])
        );
    }

    #[test]
    fn policy_flag_beats_config() {
        let empty = tempfile::tempdir().unwrap();
        let config = Config {
            keys_dir: Some(PathBuf::from("/nonexistent")),
            policy: Some(TrustPolicy::All),
            ..Config::default()
        };
        let args = KeyArgs {
            policy: Some(PolicyArg::Any),
            keys_dir: Some(empty.path().to_path_buf()),
            ..KeyArgs::default()
        };
        let settings = Settings::resolve(&args, config).unwrap();
        assert_eq!(settings.trust.policy(), &TrustPolicy::Any);
    }

    #[test]
    fn bad_signing_key_is_an_error() {
        let empty = tempfile::tempdir().unwrap();
        let args = KeyArgs {
            signing_key: Some("not base64!".to_string()),
            keys_dir: Some(empty.path().to_path_buf()),
            ..KeyArgs::default()
        };
        assert!(Settings::resolve(&args, Config::default()).is_err());
    }
}
