//! # NoteSync Engine
//!
//! Two-way reconciliation between a local notes tree and its
//! server-maintained copy.
//!
//! The [`Processor`] is the entry point: it restores (or builds) sync
//! metadata, routes incoming update batches to the initial merger or the
//! incremental updates handler, captures local mutations through its
//! observer hooks, and emits outgoing commit records. The [`Tracker`] owns
//! all per-entity sync state; the tree itself belongs to the embedder.
//!
//! ## Session shape
//!
//! One logical owner drives a session end to end:
//!
//! 1. [`Processor::model_ready_to_sync`] with the tree and any persisted
//!    metadata blob.
//! 2. [`Processor::on_sync_starting`] with the activation request.
//! 3. [`Processor::on_update_received`] per remote batch,
//!    [`Processor::build_local_changes`] /
//!    [`Processor::on_commit_completed`] per commit cycle, observer hooks
//!    per local mutation.
//! 4. [`Processor::on_sync_stopping`] to end the session.
//!
//! Fatal conditions (missing permanent roots, item-count ceiling) disconnect
//! sync and surface through the error collaborator; local data stays intact
//! and keeps accumulating unsynced changes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod local_changes;
mod merger;
mod observer;
mod ordering;
mod preprocess;
mod processor;
mod tracker;
mod updates;

pub use config::{EngineConfig, WipePolicy};
pub use error::{EngineError, EngineResult};
pub use merger::MergeStats;
pub use processor::{
    ActivationRequest, Collaborators, MetadataFate, Processor, ProcessorState, ProcessorStats,
};
pub use tracker::{TrackedEntity, Tracker};
pub use updates::UpdateStats;
