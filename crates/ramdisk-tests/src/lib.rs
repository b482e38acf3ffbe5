//! Integration tests for the ramdisk.
//!
//! This crate provides:
//! - A harness wiring a filesystem to its event bus
//! - Storage semantics tests through the filesystem facade
//! - Event ordering and listener registration tests

pub mod harness;

pub use harness::TestFs;
