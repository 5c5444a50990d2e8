//! # NoteSync Protocol
//!
//! Wire and persisted representations for the NoteSync reconciliation
//! engine.
//!
//! This crate provides:
//! - Remote entity data (updates and outgoing commits)
//! - Note specifics with legacy-title adaptation
//! - The unique-position contract (opaque ordered keys, generator trait)
//! - Client-tag hashing (deterministic GUID fingerprint)
//! - The persisted sync-metadata blob and its CBOR codec

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client_tag;
mod entity;
mod error;
mod metadata;
mod position;
mod specifics;

pub use client_tag::ClientTagHash;
pub use entity::{
    CommitRecord, CommitResponse, DeletionOrigin, EntityData, ServerId, UpdateBatch,
    UNCOMMITTED_VERSION,
};
pub use error::{ProtocolError, ProtocolResult};
pub use metadata::{EntityMetadata, ModelTypeState, SyncMetadata};
pub use position::{PositionGenerator, PositionSuffix, UniquePosition};
pub use specifics::{
    AttachmentSpecifics, NoteSpecifics, SpecialType, SpecificsHash, LEGACY_TITLE_LIMIT,
};
