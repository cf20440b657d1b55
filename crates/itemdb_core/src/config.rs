//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Whether every computed event is checked for disjointness and union
    /// exactness before delivery.
    pub check_event_invariants: bool,

    /// Name of the worker thread consuming writes and background reads.
    pub main_thread_name: String,

    /// Name of the worker thread consuming foreground reads.
    pub view_thread_name: String,

    /// Name of the thread running gated callbacks.
    pub gate_thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            check_event_invariants: cfg!(debug_assertions),
            main_thread_name: "itemdb-main".to_string(),
            view_thread_name: "itemdb-view".to_string(),
            gate_thread_name: "itemdb-gate".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether event invariants are checked.
    #[must_use]
    pub const fn check_event_invariants(mut self, value: bool) -> Self {
        self.check_event_invariants = value;
        self
    }

    /// Sets the prefix used for all worker thread names.
    #[must_use]
    pub fn thread_prefix(mut self, prefix: &str) -> Self {
        self.main_thread_name = format!("{prefix}-main");
        self.view_thread_name = format!("{prefix}-view");
        self.gate_thread_name = format!("{prefix}-gate");
        self
    }
}
