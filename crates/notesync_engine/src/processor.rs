//! The processor: sync session state machine and single entry point.
//!
//! Owns the tracker, routes remote batches to the merger or the updates
//! handler, builds outgoing commits, and reports side effects through the
//! embedder's collaborator closures. All operations run on one logical
//! owner sequence; the tree lock provides interior mutability, not
//! cross-thread contention handling.

use crate::config::{EngineConfig, WipePolicy};
use crate::error::{EngineError, EngineResult};
use crate::local_changes::build_commit_records;
use crate::merger::merge_initial_batch;
use crate::observer::ChangeObserver;
use crate::tracker::Tracker;
use crate::updates::apply_update_batch;
use notesync_model::{NodeId, NoteTree};
use notesync_protocol::{
    CommitRecord, CommitResponse, ModelTypeState, PositionGenerator, SyncMetadata, UpdateBatch,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Callbacks through which the processor reaches its embedder.
pub struct Collaborators {
    /// Persist the current sync metadata soon.
    pub schedule_save: Box<dyn Fn() + Send>,
    /// A fatal condition disconnected sync.
    pub on_error: Box<dyn Fn(&EngineError) + Send>,
    /// Unsynced local changes exist; wake the commit queue.
    pub nudge_for_commit: Box<dyn Fn() + Send>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// The request that starts a sync session.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    /// Identifier of this sync client instance. A mismatch against
    /// persisted metadata means the metadata belongs to someone else.
    pub cache_guid: String,
}

/// What happens to persisted metadata when sync stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFate {
    /// Metadata is kept for the next session.
    Keep,
    /// Metadata is cleared; the wipe policy decides about local data.
    Clear,
}

/// Lifecycle states of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Constructed, model not loaded.
    Idle,
    /// Model loaded, no usable sync metadata yet.
    ModelLoading,
    /// First update batch is being merged.
    InitialMerge,
    /// Persisted metadata restored successfully.
    MetadataRestored,
    /// Session active; updates and commits flow.
    Connected,
    /// Session paused after an error; local edits keep accumulating.
    Disconnected,
    /// Session ended.
    Stopped,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessorState::Idle => "idle",
            ProcessorState::ModelLoading => "model-loading",
            ProcessorState::InitialMerge => "initial-merge",
            ProcessorState::MetadataRestored => "metadata-restored",
            ProcessorState::Connected => "connected",
            ProcessorState::Disconnected => "disconnected",
            ProcessorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Session counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Remote updates applied onto existing entities.
    pub updates_applied: usize,
    /// Entities created from remote data (initial merge included).
    pub entities_created: usize,
    /// Entities deleted by remote tombstones.
    pub entities_deleted: usize,
    /// Conflicts resolved.
    pub conflicts_resolved: usize,
    /// Updates discarded as invalid.
    pub updates_discarded: usize,
    /// Commit records built.
    pub commits_built: usize,
}

/// The sync session entry point.
pub struct Processor {
    config: EngineConfig,
    positions: Box<dyn PositionGenerator>,
    state: ProcessorState,
    tree: Option<Arc<RwLock<NoteTree>>>,
    tracker: Option<Tracker>,
    collaborators: Option<Collaborators>,
    activation: Option<ActivationRequest>,
    nudge_valid: bool,
    stats: ProcessorStats,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("state", &self.state)
            .field("tracking", &self.tracker.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Creates an idle processor.
    pub fn new(config: EngineConfig, positions: Box<dyn PositionGenerator>) -> Self {
        Self {
            config,
            positions,
            state: ProcessorState::Idle,
            tree: None,
            tracker: None,
            collaborators: None,
            activation: None,
            nudge_valid: false,
            stats: ProcessorStats::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Session counters so far.
    #[must_use]
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// True if sync metadata exists for this session.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Loads the local model and, when a persisted metadata blob is given,
    /// tries to restore the tracker from it.
    ///
    /// An undecodable or inconsistent blob is not an error here: the
    /// tracker stays empty and the next update batch runs the initial
    /// merge instead.
    pub fn model_ready_to_sync(
        &mut self,
        metadata: Option<&[u8]>,
        tree: Arc<RwLock<NoteTree>>,
        collaborators: Collaborators,
    ) -> EngineResult<()> {
        if self.state != ProcessorState::Idle {
            return Err(EngineError::InvalidStateTransition {
                from: self.state.to_string(),
                to: ProcessorState::ModelLoading.to_string(),
            });
        }
        self.state = ProcessorState::ModelLoading;
        self.collaborators = Some(collaborators);

        if let Some(blob) = metadata {
            match SyncMetadata::decode(blob) {
                Ok(decoded) => match Tracker::from_metadata(decoded, &tree.read()) {
                    Ok(tracker) => {
                        info!(entities = tracker.count(), "sync metadata restored");
                        self.tracker = Some(tracker);
                        self.state = ProcessorState::MetadataRestored;
                    }
                    Err(e) => {
                        warn!(error = %e, "persisted metadata inconsistent with tree, starting clean");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "persisted metadata undecodable, starting clean");
                }
            }
        }
        self.tree = Some(tree);
        self.try_connect()
    }

    /// Starts (or re-arms) a sync session. Connects as soon as the model
    /// is loaded too.
    ///
    /// A fatal item-count breach reports through the error callback and
    /// leaves the session disconnected; the returned error is the same one.
    pub fn on_sync_starting(&mut self, request: ActivationRequest) -> EngineResult<()> {
        if self.state == ProcessorState::Stopped {
            return Err(EngineError::InvalidStateTransition {
                from: self.state.to_string(),
                to: ProcessorState::Connected.to_string(),
            });
        }
        self.activation = Some(request);
        self.try_connect()
    }

    fn try_connect(&mut self) -> EngineResult<()> {
        if self.tree.is_none() || self.collaborators.is_none() || self.activation.is_none() {
            return Ok(());
        }
        if !matches!(
            self.state,
            ProcessorState::ModelLoading
                | ProcessorState::MetadataRestored
                | ProcessorState::Disconnected
        ) {
            return Ok(());
        }
        let cache_guid = self
            .activation
            .as_ref()
            .map(|a| a.cache_guid.clone())
            .unwrap_or_default();

        if let Some(tracker) = &self.tracker {
            if tracker.state().cache_guid != cache_guid {
                warn!(
                    persisted = tracker.state().cache_guid,
                    requested = cache_guid,
                    "cache guid mismatch, dropping tracker for clean resync"
                );
                self.tracker = None;
                self.state = ProcessorState::ModelLoading;
                return Err(EngineError::resync_required("cache guid mismatch"));
            }
            if tracker.count() > self.config.max_tracked_items {
                let err = EngineError::ItemCountExceeded {
                    count: tracker.count(),
                    limit: self.config.max_tracked_items,
                };
                return Err(self.fail(err));
            }
        }

        self.state = ProcessorState::Connected;
        self.nudge_valid = true;
        info!("sync connected");
        if self.tracker.as_ref().is_some_and(Tracker::has_local_changes) {
            self.maybe_nudge();
        }
        Ok(())
    }

    /// Routes one batch of remote updates: to the merger when nothing is
    /// tracked yet, to the incremental handler otherwise.
    pub fn on_update_received(&mut self, batch: &UpdateBatch) -> EngineResult<()> {
        if self.state != ProcessorState::Connected {
            return Err(EngineError::NotConnected);
        }
        let tree = self.tree.clone().ok_or(EngineError::NotConnected)?;

        if self.tracker.is_none() {
            self.state = ProcessorState::InitialMerge;
            if batch.entities.len() > self.config.max_tracked_items {
                let err = EngineError::ItemCountExceeded {
                    count: batch.entities.len(),
                    limit: self.config.max_tracked_items,
                };
                return Err(self.fail(err));
            }
            let type_state = ModelTypeState {
                progress_marker: Vec::new(),
                cache_guid: self
                    .activation
                    .as_ref()
                    .map(|a| a.cache_guid.clone())
                    .unwrap_or_default(),
                encryption_key_name: batch.encryption_key_name.clone().unwrap_or_default(),
                initial_sync_done: true,
            };
            let merged = {
                let mut guard = tree.write();
                merge_initial_batch(
                    &mut guard,
                    batch,
                    self.positions.as_ref(),
                    type_state,
                    self.config.max_forest_depth,
                )
            };
            match merged {
                Ok((tracker, stats)) => {
                    info!(
                        matched = stats.matched,
                        created = stats.created,
                        scheduled = stats.scheduled_for_commit,
                        discarded = stats.discarded,
                        "initial merge complete"
                    );
                    self.stats.entities_created += stats.created;
                    self.stats.updates_applied += stats.matched;
                    self.stats.updates_discarded += stats.discarded;
                    self.tracker = Some(tracker);
                    self.state = ProcessorState::Connected;
                }
                Err(e) if e.is_fatal() => return Err(self.fail(e)),
                Err(e) => {
                    self.state = ProcessorState::Connected;
                    return Err(e);
                }
            }
        } else {
            let stats = {
                let tracker = self.tracker.as_mut().ok_or(EngineError::NotConnected)?;
                let mut guard = tree.write();
                apply_update_batch(&mut guard, tracker, batch)?
            };
            debug!(
                applied = stats.applied,
                created = stats.created,
                deleted = stats.deleted,
                conflicts = stats.conflicts,
                ignored = stats.ignored,
                discarded = stats.discarded,
                "update batch applied"
            );
            self.stats.updates_applied += stats.applied;
            self.stats.entities_created += stats.created;
            self.stats.entities_deleted += stats.deleted;
            self.stats.conflicts_resolved += stats.conflicts;
            self.stats.updates_discarded += stats.discarded;

            let count = self.tracker.as_ref().map_or(0, Tracker::count);
            if count > self.config.max_tracked_items {
                let err = EngineError::ItemCountExceeded {
                    count,
                    limit: self.config.max_tracked_items,
                };
                return Err(self.fail(err));
            }
        }

        self.notify_save();
        if self.tracker.as_ref().is_some_and(Tracker::has_local_changes) {
            self.maybe_nudge();
        }
        Ok(())
    }

    /// Builds the next batch of outgoing commit records.
    pub fn build_local_changes(&mut self) -> EngineResult<Vec<CommitRecord>> {
        if self.state != ProcessorState::Connected {
            return Err(EngineError::NotConnected);
        }
        let tree = self.tree.clone().ok_or(EngineError::NotConnected)?;
        let tracker = self.tracker.as_mut().ok_or(EngineError::NotConnected)?;
        let records = build_commit_records(
            &tree.read(),
            tracker,
            self.config.max_commit_batch_size,
            &self.config.client_version,
        )?;
        self.stats.commits_built += records.len();
        self.notify_save();
        Ok(records)
    }

    /// Applies the server's acknowledgments of committed records: fresh
    /// ids and versions for live entities, pruning for acked tombstones.
    ///
    /// Responses arriving after a disconnect are dropped; they must not
    /// mutate a stopped tracker.
    pub fn on_commit_completed(&mut self, responses: &[CommitResponse]) -> EngineResult<()> {
        if self.state != ProcessorState::Connected {
            debug!(state = %self.state, "commit response after disconnect ignored");
            return Ok(());
        }
        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(());
        };
        for response in responses {
            let Some(entity) = tracker.entity_for_client_tag(&response.client_tag_hash) else {
                debug!(hash = %response.client_tag_hash, "commit response for unknown entity");
                continue;
            };
            if entity.is_deleted() {
                // The server acknowledged the deletion; the tombstone has
                // served its purpose.
                tracker.remove(&response.client_tag_hash);
                continue;
            }
            tracker.update_server_id(&response.client_tag_hash, response.server_id.clone());
            tracker.set_server_version(&response.client_tag_hash, response.version);
            // Bounded ack: edits made while the commit was in flight stay
            // pending and go out with the next commit.
            tracker.ack_in_flight_commit(&response.client_tag_hash);
        }
        self.notify_save();
        Ok(())
    }

    /// Stops the session. Idempotent. Returns whether the embedder should
    /// wipe local data, per the configured policy.
    pub fn on_sync_stopping(&mut self, fate: MetadataFate) -> bool {
        if self.state == ProcessorState::Stopped {
            return false;
        }
        self.nudge_valid = false;
        self.state = ProcessorState::Stopped;
        match fate {
            MetadataFate::Keep => false,
            MetadataFate::Clear => {
                let was_tracking = self.tracker.is_some();
                self.tracker = None;
                self.activation = None;
                self.notify_save();
                match self.config.wipe_policy {
                    WipePolicy::Never => false,
                    WipePolicy::IfWasTracking => was_tracking,
                    WipePolicy::Always => true,
                }
            }
        }
    }

    /// Verifies the tracker's data-model invariants against the tree.
    /// Debug and test aid; a no-op while nothing is tracked.
    pub fn check_invariants(&self) -> EngineResult<()> {
        let (Some(tree), Some(tracker)) = (&self.tree, &self.tracker) else {
            return Ok(());
        };
        tracker.check_invariants(&tree.read())
    }

    /// Serializes the current sync metadata for persistence.
    pub fn encode_sync_metadata(&self) -> EngineResult<Vec<u8>> {
        let tracker = self.tracker.as_ref().ok_or(EngineError::NotConnected)?;
        Ok(tracker.to_metadata().encode()?)
    }

    /// A node was created locally.
    pub fn on_node_added(&mut self, node: NodeId) -> EngineResult<()> {
        self.observe(|observer| observer.node_added(node))
    }

    /// A node and its subtree are about to be removed locally. Must run
    /// before the removal so the subtree is still readable.
    pub fn on_node_will_be_removed(&mut self, node: NodeId) -> EngineResult<()> {
        self.observe(|observer| observer.node_will_be_removed(node))
    }

    /// A node was moved locally.
    pub fn on_node_moved(&mut self, node: NodeId) -> EngineResult<()> {
        self.observe(|observer| observer.node_moved(node))
    }

    /// A node's content changed locally.
    pub fn on_node_changed(&mut self, node: NodeId) -> EngineResult<()> {
        self.observe(|observer| observer.node_changed(node))
    }

    /// The children of a node were reordered locally.
    pub fn on_children_reordered(&mut self, parent: NodeId) -> EngineResult<()> {
        self.observe(|observer| observer.children_reordered(parent))
    }

    fn observe(
        &mut self,
        hook: impl FnOnce(&mut ChangeObserver<'_>) -> EngineResult<bool>,
    ) -> EngineResult<()> {
        // Local mutations while not tracking are invisible to sync; the
        // initial merge will pick them up.
        let (Some(tree), Some(tracker)) = (self.tree.clone(), self.tracker.as_mut()) else {
            return Ok(());
        };
        let changed = {
            let guard = tree.read();
            let mut observer = ChangeObserver {
                tree: &guard,
                tracker,
                positions: self.positions.as_ref(),
            };
            hook(&mut observer)?
        };
        if changed {
            self.notify_save();
            self.maybe_nudge();
        }
        Ok(())
    }

    fn maybe_nudge(&self) {
        if !self.nudge_valid || self.state != ProcessorState::Connected {
            return;
        }
        if let Some(collaborators) = &self.collaborators {
            (collaborators.nudge_for_commit)();
        }
    }

    fn notify_save(&self) {
        if let Some(collaborators) = &self.collaborators {
            (collaborators.schedule_save)();
        }
    }

    /// Records a fatal error: reports it, disconnects, and hands it back
    /// for propagation.
    fn fail(&mut self, err: EngineError) -> EngineError {
        error!(error = %err, "fatal sync error, disconnecting");
        self.nudge_valid = false;
        self.state = ProcessorState::Disconnected;
        if let Some(collaborators) = &self.collaborators {
            (collaborators.on_error)(&err);
        }
        err
    }
}
