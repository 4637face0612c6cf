//! FileCloak - bulk file encryption with a self-describing envelope.
//!
//! Transforms files between plaintext and an encrypted envelope format in
//! one of two modes:
//! - **randomized**: AES-256-CTR with a fresh IV per file and an
//!   HMAC-SHA256 trailer (encrypt-then-MAC)
//! - **deterministic**: AES-SIV chunk frames with per-chunk associated
//!   data, so identical input yields byte-identical output
//!
//! Files are selected with find(1) `-path` glob patterns, processed by a
//! bounded-parallel scheduler, and replaced atomically.

// Tests that resolve paths relative to the working directory serialize on
// this lock, because the working directory is process-global.
#[cfg(test)]
pub(crate) static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub mod app;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod file;
pub mod pathmatch;
pub mod processor;
pub mod secret;
pub mod types;
pub mod worker;
