//! Shared utilities.
//!
//! Test helpers for files, timestamps and stand-in converter executables.

#[cfg(test)]
pub mod testutil;
