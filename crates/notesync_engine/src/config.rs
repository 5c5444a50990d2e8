//! Configuration for the reconciliation engine.

/// What to do with local notes when sync stops and metadata is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WipePolicy {
    /// Never touch local data.
    #[default]
    Never,
    /// Wipe local data only if this session had been tracking.
    IfWasTracking,
    /// Always wipe local data.
    Always,
}

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Circuit breaker: maximum number of tracked plus incoming items
    /// before sync refuses to proceed.
    pub max_tracked_items: usize,
    /// Maximum depth accepted when building the remote forest. Guards
    /// against malicious or cyclic input.
    pub max_forest_depth: usize,
    /// Maximum number of commit records built per nudge.
    pub max_commit_batch_size: usize,
    /// Local-data wipe policy applied when metadata is cleared.
    pub wipe_policy: WipePolicy,
    /// Client version string recorded in deletion origins.
    pub client_version: String,
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_tracked_items: 100_000,
            max_forest_depth: 200,
            max_commit_batch_size: 100,
            wipe_policy: WipePolicy::Never,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the tracked-item ceiling.
    #[must_use]
    pub fn with_max_tracked_items(mut self, limit: usize) -> Self {
        self.max_tracked_items = limit;
        self
    }

    /// Sets the maximum remote forest depth.
    #[must_use]
    pub fn with_max_forest_depth(mut self, depth: usize) -> Self {
        self.max_forest_depth = depth;
        self
    }

    /// Sets the commit batch size.
    #[must_use]
    pub fn with_max_commit_batch_size(mut self, size: usize) -> Self {
        self.max_commit_batch_size = size;
        self
    }

    /// Sets the wipe policy.
    #[must_use]
    pub fn with_wipe_policy(mut self, policy: WipePolicy) -> Self {
        self.wipe_policy = policy;
        self
    }

    /// Sets the client version recorded in deletion origins.
    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
