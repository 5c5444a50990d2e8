//! # NoteSync Testkit
//!
//! Test utilities for NoteSync.
//!
//! This crate provides:
//! - Remote entity and batch builders for reconciliation tests
//! - A reference fractional-position generator (midpoint over byte keys)
//! - Property-based generators for note specifics using proptest

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod positions;

pub use fixtures::{permanent_root_updates, RemoteEntityBuilder};
pub use positions::MidpointPositionGenerator;
