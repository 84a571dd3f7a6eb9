//! adb - maintainer tool for ADB containers
#![allow(clippy::missing_errors_doc)]
//!
//! Lists blocks, verifies and replaces signatures, dumps value trees and
//! generates signing keys.
//!
//! # Configuration
//!
//! Settings come from command-line flags, then `ADB_*` environment
//! variables, then `$ADB_HOME/config.toml`:
//!
//! ```toml
//! keys_dir = "/etc/adb/keys"
//! private_keys = ["/root/.adb/release.key"]
//!
//! [policy]
//! require = ["5f0c6e1b2a9d4c7e8f10a2b3c4d5e6f7"]
//! ```

pub mod cmd;
pub mod config;

use std::path::PathBuf;

use adb_format::KeyId;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "adb")]
#[command(version, about = "Inspect, verify and re-sign ADB containers")]
pub struct Cli {
    /// Key and policy selection
    #[command(flatten)]
    pub keys: KeyArgs,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the configuration file.
#[derive(Debug, Default, Args)]
pub struct KeyArgs {
    /// Configuration file [default: $ADB_HOME/config.toml]
    #[arg(long, global = true, env = "ADB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of trusted public keys
    #[arg(long, global = true, env = "ADB_KEYS_DIR")]
    pub keys_dir: Option<PathBuf>,

    /// Private key file to sign with (repeatable)
    #[arg(long = "key", global = true)]
    pub private_keys: Vec<PathBuf>,

    /// Base64 private key to sign with
    #[arg(long, global = true, env = "ADB_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Which signatures a file needs to be accepted
    #[arg(long, global = true, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Require a verified signature from this key id (repeatable)
    #[arg(long = "require", global = true, value_name = "KEY_ID")]
    pub required: Vec<KeyId>,
}

/// Policies selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// One trusted signature is enough
    Any,
    /// Every signature must verify
    All,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate an Ed25519 signing key pair
    Keygen {
        /// Base name of the key files
        #[arg(default_value = "adb")]
        name: String,
        /// Directory to write `<name>.key` and `<name>.pub` into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },
    /// List the blocks of a container
    Blocks {
        /// Container file
        file: PathBuf,
    },
    /// Check the signatures of a container against the trusted keys
    Verify {
        /// Container file
        file: PathBuf,
    },
    /// Print the value tree of a container
    Dump {
        /// Container file
        file: PathBuf,
    },
    /// Replace the signatures of a container with fresh ones
    Resign {
        /// Container file
        file: PathBuf,
        /// Write here instead of replacing the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove every signature from a container
    Strip {
        /// Container file
        file: PathBuf,
        /// Write here instead of replacing the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
