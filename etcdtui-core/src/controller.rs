//! Action controller
//!
//! One method per operator command. Each validates its preconditions, calls
//! the store, and on success rebuilds the tree and updates the session. A
//! failed call leaves tree and selection exactly as they were and is
//! reported as a single status line plus a debug-log record.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::ConnectionManager;
use crate::debug_log::{DebugLog, LogLevel};
use crate::error::{AppError, StoreOp};
use crate::live::{Generation, WatchMsg, WatchPanel, spawn_watch};
use crate::model::{Entry, LeaseId, WatchScope};
use crate::session::{Mode, Session};
use crate::store::KvStore;
use crate::tree::{self, NodeRole, TreeNode, TreeRow, TreeView};

/// Prefix listed when no search filter is set.
const ALL_KEYS: &str = "";

/// Lease information shown next to an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseInfo {
    None,
    Ttl(i64),
    /// The lease exists but its TTL could not be read.
    Unknown(LeaseId),
}

/// Content of the details pane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Details {
    #[default]
    Empty,
    Directory {
        path: String,
        children: usize,
    },
    Entry {
        entry: Entry,
        lease: LeaseInfo,
    },
    SearchResults {
        prefix: String,
        count: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub level: LogLevel,
    pub text: String,
}

/// Cluster facts shown in the status bar while no message is pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub leader: String,
    pub keys: u64,
}

/// A create or edit submitted from the form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutRequest {
    /// Key the form was opened on; `None` when creating.
    pub original_key: Option<String>,
    pub key: String,
    pub value: String,
}

impl PutRequest {
    pub fn create(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            original_key: None,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn edit(original: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            original_key: Some(original.into()),
            key: key.into(),
            value: value.into(),
        }
    }
}

pub struct Controller {
    conn: ConnectionManager,
    session: Session,
    tree: TreeNode,
    view: TreeView,
    filter: Option<String>,
    details: Details,
    status: Option<StatusLine>,
    summary: Option<Summary>,
    watch_panel: Option<WatchPanel>,
    watch_tx: mpsc::UnboundedSender<WatchMsg>,
    next_generation: Generation,
    pending_delete: Option<String>,
    profile: Option<String>,
    debug: DebugLog,
}

impl Controller {
    /// Watch notifications are sent to `watch_tx`; the UI loop drains the
    /// matching receiver into [`Controller::apply_watch_msg`].
    pub fn new(conn: ConnectionManager, watch_tx: mpsc::UnboundedSender<WatchMsg>) -> Self {
        Self {
            conn,
            session: Session::new(),
            tree: TreeNode::root(),
            view: TreeView::new(),
            filter: None,
            details: Details::Empty,
            status: None,
            summary: None,
            watch_panel: None,
            watch_tx,
            next_generation: 0,
            pending_delete: None,
            profile: None,
            debug: DebugLog::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    pub fn tree(&self) -> &TreeNode {
        &self.tree
    }

    pub fn view(&self) -> &TreeView {
        &self.view
    }

    pub fn rows(&self) -> Vec<TreeRow> {
        self.view.rows(&self.tree)
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn watch_panel(&self) -> Option<&WatchPanel> {
        self.watch_panel.as_ref()
    }

    pub fn watch_panel_mut(&mut self) -> Option<&mut WatchPanel> {
        self.watch_panel.as_mut()
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn debug(&self) -> &DebugLog {
        &self.debug
    }

    pub fn debug_mut(&mut self) -> &mut DebugLog {
        &mut self.debug
    }

    /// True once `connect` has succeeded and until `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.profile.is_some()
    }

    pub fn set_status(&mut self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        self.debug.push(level, text.clone());
        self.status = Some(StatusLine { level, text });
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Surface a failure as the status line.
    pub fn report(&mut self, err: &AppError) {
        let level = match err {
            AppError::NoSelection | AppError::ValidationFailed(_) | AppError::AlreadyActive { .. } => {
                LogLevel::Warn
            }
            _ => LogLevel::Error,
        };
        self.set_status(level, err.to_string());
    }

    fn surface<T>(&mut self, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn client(&self) -> Result<Arc<dyn KvStore>, AppError> {
        self.conn.client().await
    }

    // Connection

    /// Make `store` the active client and load its keyspace.
    ///
    /// Any open modal and watch are closed first. If the store cannot be
    /// reached the previous connection stays active.
    pub async fn connect(&mut self, store: Arc<dyn KvStore>, profile: &str) -> Result<usize, AppError> {
        let result = self.connect_inner(store, profile).await;
        self.surface(result)
    }

    async fn connect_inner(&mut self, store: Arc<dyn KvStore>, profile: &str) -> Result<usize, AppError> {
        self.debug.info(format!("Connecting to profile: {}", profile));
        self.conn.connect(store).await?;
        self.reset_view();
        self.profile = Some(profile.to_string());
        let count = self.refresh_inner().await?;
        self.set_status(LogLevel::Info, format!("Connected to {}", profile));
        Ok(count)
    }

    pub async fn disconnect(&mut self) {
        self.reset_view();
        self.conn.disconnect().await;
        self.profile = None;
        self.summary = None;
        self.debug.info("Disconnected");
    }

    fn reset_view(&mut self) {
        self.close_watch();
        self.session.exit_mode();
        self.session.clear_selection();
        self.pending_delete = None;
        self.filter = None;
        self.tree = TreeNode::root();
        self.view = TreeView::new();
        self.details = Details::Empty;
    }

    // Refresh and search

    /// Reload the keyspace (or the current search prefix) and rebuild the
    /// tree. Returns the number of keys shown.
    pub async fn refresh(&mut self) -> Result<usize, AppError> {
        let result = self.refresh_inner().await;
        if result.is_ok() {
            self.clear_status();
        }
        self.surface(result)
    }

    async fn refresh_inner(&mut self) -> Result<usize, AppError> {
        let client = self.client().await?;
        let prefix = self.filter.clone().unwrap_or_else(|| ALL_KEYS.to_string());
        let entries = client
            .list(&prefix)
            .await
            .map_err(|e| AppError::store(StoreOp::List, e))?;

        self.rebuild(&entries);
        self.retain_selection();
        self.update_summary(client.as_ref()).await;
        self.debug.debug(format!("Loaded {} keys", entries.len()));
        Ok(self.tree.leaf_count())
    }

    fn rebuild(&mut self, entries: &[Entry]) {
        self.tree = tree::project(entries);
        self.view.reconcile(&self.tree);
    }

    /// Replace the selected snapshot with its rebuilt counterpart, or drop it
    /// when the key vanished.
    fn retain_selection(&mut self) {
        let Some(key) = self.session.selected().map(|e| e.key.clone()) else {
            return;
        };
        let fresh = self
            .tree
            .find(&tree::normalize_path(&key))
            .and_then(TreeNode::entry)
            .filter(|e| e.key == key)
            .cloned();
        match fresh {
            Some(entry) => {
                if let Details::Entry { entry: shown, .. } = &mut self.details {
                    if shown.key == entry.key {
                        *shown = entry.clone();
                    }
                }
                self.session.select_entry(entry);
            }
            None => {
                tracing::debug!(%key, "selected key vanished after refresh");
                self.session.clear_selection();
                if matches!(self.details, Details::Entry { .. }) {
                    self.details = Details::Empty;
                }
            }
        }
    }

    async fn update_summary(&mut self, client: &dyn KvStore) {
        let leader = match client.status().await {
            Ok(status) => status.leader_label().to_string(),
            Err(e) => {
                self.debug.warn(format!("Failed to get cluster status: {}", e));
                "unknown".to_string()
            }
        };
        let keys = match client.count(ALL_KEYS).await {
            Ok(n) => n,
            Err(e) => {
                self.debug.warn(format!("Failed to count keys: {}", e));
                self.tree.leaf_count() as u64
            }
        };
        self.summary = Some(Summary { leader, keys });
    }

    /// Show only the keys under `prefix`. An empty prefix clears the filter.
    pub async fn search(&mut self, prefix: &str) -> Result<usize, AppError> {
        let result = self.search_inner(prefix).await;
        self.surface(result)
    }

    async fn search_inner(&mut self, prefix: &str) -> Result<usize, AppError> {
        if prefix.is_empty() {
            return self.clear_search_inner().await;
        }
        let client = self.client().await?;
        let entries = client
            .list(prefix)
            .await
            .map_err(|e| AppError::store(StoreOp::List, e))?;

        self.filter = Some(prefix.to_string());
        self.tree = tree::project(&entries);
        self.view = TreeView::new();
        self.view.reconcile(&self.tree);
        self.session.clear_selection();
        let count = self.tree.leaf_count();
        self.details = Details::SearchResults {
            prefix: prefix.to_string(),
            count,
        };
        self.finish_form();
        self.set_status(LogLevel::Info, format!("{} keys found for {}", count, prefix));
        Ok(count)
    }

    /// Drop the search filter and show the whole keyspace again.
    pub async fn clear_search(&mut self) -> Result<usize, AppError> {
        let result = self.clear_search_inner().await;
        self.surface(result)
    }

    async fn clear_search_inner(&mut self) -> Result<usize, AppError> {
        let previous = self.filter.take();
        match self.refresh_inner().await {
            Ok(count) => {
                self.session.clear_selection();
                self.details = Details::Empty;
                self.finish_form();
                self.set_status(LogLevel::Info, "Search cleared");
                Ok(count)
            }
            Err(e) => {
                self.filter = previous;
                Err(e)
            }
        }
    }

    // Mutations

    /// Write a key from the form. Changing the key of an existing entry
    /// deletes the old key first, then writes the new one.
    pub async fn put(&mut self, request: PutRequest) -> Result<(), AppError> {
        let result = self.put_inner(request).await;
        self.surface(result)
    }

    async fn put_inner(&mut self, request: PutRequest) -> Result<(), AppError> {
        // Whitespace is legal in keys; it only counts against emptiness.
        let key = request.key;
        if key.trim().is_empty() {
            return Err(AppError::ValidationFailed("key cannot be empty".to_string()));
        }
        let client = self.client().await?;

        let renamed_from = request.original_key.filter(|old| *old != key);
        if let Some(old) = &renamed_from {
            client
                .delete(old)
                .await
                .map_err(|e| AppError::store(StoreOp::Delete, e))?;
            self.debug.info(format!("Deleted {} for rename", old));

            if let Err(e) = client.put(&key, &request.value).await {
                // Show the keyspace as it now is before reporting.
                if let Err(refresh_err) = self.refresh_inner().await {
                    self.debug
                        .warn(format!("Refresh after failed rename failed: {}", refresh_err));
                }
                return Err(AppError::PartialRename {
                    old: old.clone(),
                    new: key,
                    reason: e.to_string(),
                });
            }
        } else {
            client
                .put(&key, &request.value)
                .await
                .map_err(|e| AppError::store(StoreOp::Put, e))?;
        }

        self.finish_form();
        self.refresh_inner().await?;
        self.view.reveal(&self.tree, &key);

        match client.get(&key).await {
            Ok(entry) => {
                let lease = self.lease_info(client.as_ref(), &entry).await;
                self.session.select_entry(entry.clone());
                self.details = Details::Entry { entry, lease };
                let text = match &renamed_from {
                    Some(old) => format!("Renamed {} to {}", old, key),
                    None => format!("Saved {}", key),
                };
                self.set_status(LogLevel::Info, text);
            }
            Err(e) => {
                self.debug.warn(format!("Saved but failed to refresh details: {}", e));
                self.status = Some(StatusLine {
                    level: LogLevel::Warn,
                    text: "Saved but failed to refresh details".to_string(),
                });
            }
        }
        Ok(())
    }

    /// First step of a delete: check the selection and open the
    /// confirmation. No store call is made here.
    pub fn request_delete(&mut self) -> Result<String, AppError> {
        let result = self.request_delete_inner();
        self.surface(result)
    }

    fn request_delete_inner(&mut self) -> Result<String, AppError> {
        let key = self
            .session
            .selected()
            .map(|e| e.key.clone())
            .ok_or(AppError::NoSelection)?;
        self.session.enter_mode(Mode::ConfirmActive)?;
        self.debug.info(format!("Confirm delete of {}", key));
        self.pending_delete = Some(key.clone());
        Ok(key)
    }

    /// Second step of a delete: close the confirmation and delete the key.
    pub async fn confirm_delete(&mut self) -> Result<(), AppError> {
        let result = self.confirm_delete_inner().await;
        self.surface(result)
    }

    async fn confirm_delete_inner(&mut self) -> Result<(), AppError> {
        let key = self.pending_delete.take().ok_or(AppError::NoSelection)?;
        if self.session.mode() == Mode::ConfirmActive {
            self.session.exit_mode();
        }
        let client = self.client().await?;
        client
            .delete(&key)
            .await
            .map_err(|e| AppError::store(StoreOp::Delete, e))?;

        self.session.clear_selection();
        self.details = Details::Empty;
        self.refresh_inner().await?;
        self.sync_cursor_details().await;
        self.set_status(LogLevel::Info, format!("Deleted {}", key));
        Ok(())
    }

    // Watch

    /// Watch the node under the cursor: the selected key, or every key
    /// under a directory node. A watch already open is replaced.
    pub async fn start_watch(&mut self) -> Result<(), AppError> {
        let result = self.start_watch_inner().await;
        self.surface(result)
    }

    async fn start_watch_inner(&mut self) -> Result<(), AppError> {
        let (scope, current) = match self.session.selected() {
            Some(entry) => (WatchScope::Key(entry.key.clone()), Some(entry.value.clone())),
            None => {
                let path = self
                    .view
                    .cursor()
                    .filter(|p| self.tree.find(p).is_some_and(TreeNode::has_children))
                    .ok_or(AppError::NoSelection)?;
                (WatchScope::Prefix(format!("{}/", path)), None)
            }
        };

        let replacing = self.session.mode() == Mode::WatchActive;
        if !replacing && self.session.mode().is_modal() {
            return Err(AppError::AlreadyActive {
                active: self.session.mode(),
            });
        }
        let client = self.client().await?;

        // The previous subscription is cancelled before the new one exists.
        if self.session.cancel_watch() {
            self.debug.debug("Cancelled previous watch");
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = spawn_watch(client, scope.clone(), generation, self.watch_tx.clone());
        self.session.set_watch(handle);
        self.watch_panel = Some(WatchPanel::new(scope.clone(), generation, current.as_deref()));
        if !replacing {
            self.session.enter_mode(Mode::WatchActive)?;
        }
        self.set_status(LogLevel::Info, format!("Watching {}", scope));
        Ok(())
    }

    /// Close the watch panel, cancelling its subscription first.
    pub fn stop_watch(&mut self) {
        let scope = self.close_watch();
        if self.session.mode() == Mode::WatchActive {
            self.session.exit_mode();
        }
        if let Some(scope) = scope {
            self.set_status(LogLevel::Info, format!("Watch stopped for {}", scope));
        }
    }

    fn close_watch(&mut self) -> Option<WatchScope> {
        self.session.cancel_watch();
        self.watch_panel.take().map(|panel| panel.scope().clone())
    }

    /// Apply a message drained from the watch channel. Messages from any
    /// subscription other than the current one are discarded.
    pub fn apply_watch_msg(&mut self, msg: WatchMsg) -> bool {
        let current = self.session.watch().map(|w| w.generation());
        let Some(panel) = self
            .watch_panel
            .as_mut()
            .filter(|p| Some(p.generation()) == current && p.generation() == msg.generation)
        else {
            tracing::trace!(generation = msg.generation, ?current, "dropping stale watch message");
            return false;
        };
        if let Some(err) = panel.apply(msg.update) {
            self.report(&err);
        }
        true
    }

    // Modals

    /// Open the edit form on the selected entry.
    pub fn open_edit_form(&mut self) -> Result<Entry, AppError> {
        let result = self.open_edit_form_inner();
        self.surface(result)
    }

    fn open_edit_form_inner(&mut self) -> Result<Entry, AppError> {
        let entry = self.session.selected().cloned().ok_or(AppError::NoSelection)?;
        self.session.enter_mode(Mode::FormActive)?;
        self.debug.info(format!("Opening edit form for key: {}", entry.key));
        Ok(entry)
    }

    /// Open the create form. Returns a key prefix suggested by the cursor
    /// position (the directory under the cursor).
    pub fn open_create_form(&mut self) -> Result<String, AppError> {
        let result = self.session.enter_mode(Mode::FormActive);
        self.surface(result)?;
        self.debug.info("Opening form for new key");
        Ok(self.suggested_prefix())
    }

    pub fn open_search_form(&mut self) -> Result<String, AppError> {
        let result = self.session.enter_mode(Mode::FormActive);
        self.surface(result)?;
        self.debug.info("Opening search form");
        Ok(self.filter.clone().unwrap_or_else(|| tree::ROOT_PATH.to_string()))
    }

    pub fn show_help(&mut self) -> Result<(), AppError> {
        let result = self.session.enter_mode(Mode::HelpActive);
        self.surface(result)
    }

    /// Close whatever modal is open.
    pub fn close_modal(&mut self) {
        match self.session.mode() {
            Mode::Browsing => {}
            Mode::WatchActive => self.stop_watch(),
            Mode::ConfirmActive => {
                self.pending_delete = None;
                self.session.exit_mode();
                self.debug.debug("Delete cancelled");
            }
            Mode::FormActive | Mode::HelpActive => {
                self.session.exit_mode();
            }
        }
    }

    fn finish_form(&mut self) {
        if self.session.mode() == Mode::FormActive {
            self.session.exit_mode();
        }
    }

    fn suggested_prefix(&self) -> String {
        let Some(cursor) = self.view.cursor() else {
            return tree::ROOT_PATH.to_string();
        };
        let dir = match self.tree.find(cursor).map(TreeNode::role) {
            Some(NodeRole::Branch) | Some(NodeRole::BranchAndLeaf(_)) => Some(cursor.to_string()),
            _ => tree::parent_path(cursor),
        };
        match dir {
            Some(d) if d != tree::ROOT_PATH => format!("{}/", d),
            _ => tree::ROOT_PATH.to_string(),
        }
    }

    // Navigation

    pub async fn move_cursor(&mut self, delta: isize) {
        self.view.move_by(&self.tree, delta);
        self.sync_cursor_details().await;
    }

    pub async fn cursor_first(&mut self) {
        self.view.move_first(&self.tree);
        self.sync_cursor_details().await;
    }

    pub async fn cursor_last(&mut self) {
        self.view.move_last(&self.tree);
        self.sync_cursor_details().await;
    }

    /// Expand or collapse the node under the cursor.
    pub async fn toggle_expand(&mut self) {
        if let Some(path) = self.view.cursor().map(str::to_string) {
            self.view.toggle(&self.tree, &path);
        }
        self.sync_cursor_details().await;
    }

    pub async fn expand(&mut self) {
        if let Some(path) = self.view.cursor().map(str::to_string) {
            self.view.expand(&self.tree, &path);
        }
    }

    pub async fn collapse(&mut self) {
        self.view.collapse_or_parent(&self.tree);
        self.sync_cursor_details().await;
    }

    /// Select the entry under the cursor (or clear the selection on a
    /// directory) and fill the details pane.
    async fn sync_cursor_details(&mut self) {
        let node = self.view.cursor().and_then(|p| self.tree.find(p));
        let Some(node) = node else {
            self.session.clear_selection();
            if !matches!(self.details, Details::SearchResults { .. }) {
                self.details = Details::Empty;
            }
            return;
        };

        match node.role() {
            NodeRole::Leaf(entry) | NodeRole::BranchAndLeaf(entry) => {
                let entry = entry.clone();
                let lease = match self.client().await {
                    Ok(client) => self.lease_info(client.as_ref(), &entry).await,
                    Err(_) if entry.has_lease() => LeaseInfo::Unknown(entry.lease),
                    Err(_) => LeaseInfo::None,
                };
                self.session.select_entry(entry.clone());
                self.details = Details::Entry { entry, lease };
            }
            NodeRole::Branch => {
                let details = Details::Directory {
                    path: node.path().to_string(),
                    children: node.children().count(),
                };
                self.session.clear_selection();
                self.details = details;
            }
        }
    }

    async fn lease_info(&mut self, client: &dyn KvStore, entry: &Entry) -> LeaseInfo {
        if !entry.has_lease() {
            return LeaseInfo::None;
        }
        match client.lease_ttl(entry.lease).await {
            Ok(ttl) => LeaseInfo::Ttl(ttl),
            Err(e) => {
                self.debug
                    .warn(format!("Failed to get TTL for lease {:x}: {}", entry.lease, e));
                LeaseInfo::Unknown(entry.lease)
            }
        }
    }
}
