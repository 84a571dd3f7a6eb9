//! Subcommand implementations.

pub mod blocks;
pub mod dump;
pub mod keygen;
pub mod rewrite;
pub mod verify;
