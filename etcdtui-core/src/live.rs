//! Live-update integration
//!
//! A watch runs on its own task and forwards notifications to the UI loop
//! over an unbounded channel. Every message carries the generation of the
//! subscription that produced it; the UI applies a message only while that
//! generation is still the active one, so output from a replaced or
//! cancelled watch can never reach the panel.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::model::{WatchEvent, WatchEventKind, WatchScope};
use crate::store::KvStore;

pub type Generation = u64;

/// Lines kept in the watch panel before the oldest are dropped.
pub const WATCH_PANEL_CAP: usize = 1_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchUpdate {
    Event(WatchEvent),
    /// The subscription ended on its own. `error` is set when it failed.
    Ended { error: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchMsg {
    pub generation: Generation,
    pub update: WatchUpdate,
}

/// Owner of a running watch task.
///
/// Dropping the handle cancels the task. After cancellation the task sends
/// nothing further.
#[derive(Debug)]
pub struct WatchHandle {
    generation: Generation,
    scope: WatchScope,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn scope(&self) -> &WatchScope {
        &self.scope
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            tracing::debug!(generation = self.generation, scope = %self.scope, "cancelling watch");
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a watch on `scope` and forward its notifications to `tx`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_watch(
    store: Arc<dyn KvStore>,
    scope: WatchScope,
    generation: Generation,
    tx: mpsc::UnboundedSender<WatchMsg>,
) -> WatchHandle {
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let task_scope = scope.clone();

    let task = tokio::spawn(async move {
        let (sink, mut events) = mpsc::unbounded_channel();
        let watch = store.watch(&task_scope, sink);
        tokio::pin!(watch);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    tracing::trace!(generation, "watch task cancelled");
                    return;
                }
                Some(event) = events.recv() => {
                    let msg = WatchMsg { generation, update: WatchUpdate::Event(event) };
                    if tx.send(msg).is_err() {
                        return;
                    }
                }
                result = &mut watch => {
                    while let Ok(event) = events.try_recv() {
                        let msg = WatchMsg { generation, update: WatchUpdate::Event(event) };
                        if tx.send(msg).is_err() {
                            return;
                        }
                    }
                    let error = result.err().map(|e| e.to_string());
                    match &error {
                        Some(reason) => tracing::warn!(generation, scope = %task_scope, %reason, "watch failed"),
                        None => tracing::debug!(generation, scope = %task_scope, "watch stream closed"),
                    }
                    let _ = tx.send(WatchMsg { generation, update: WatchUpdate::Ended { error } });
                    return;
                }
            }
        }
    });

    tracing::info!(generation, scope = %scope, "watch started");
    WatchHandle {
        generation,
        scope,
        cancel: Some(cancel_tx),
        task,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchLineKind {
    Info,
    Value,
    Put,
    Delete,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchLine {
    pub kind: WatchLineKind,
    pub text: String,
}

impl WatchLine {
    fn new(kind: WatchLineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Rolling log shown by the watch panel.
#[derive(Debug)]
pub struct WatchPanel {
    scope: WatchScope,
    generation: Generation,
    lines: VecDeque<WatchLine>,
    cap: usize,
    events_seen: u64,
    ended: bool,
    /// Lines scrolled up from the bottom.
    pub scroll: usize,
    pub follow: bool,
}

impl WatchPanel {
    pub fn new(scope: WatchScope, generation: Generation, current: Option<&str>) -> Self {
        let mut panel = Self {
            scope,
            generation,
            lines: VecDeque::new(),
            cap: WATCH_PANEL_CAP,
            events_seen: 0,
            ended: false,
            scroll: 0,
            follow: true,
        };
        let target = panel.scope.to_string();
        panel.push(WatchLineKind::Info, format!("Started watching key: {}", target));
        if let Some(value) = current {
            panel.push(WatchLineKind::Info, "Current value:");
            panel.push_block(WatchLineKind::Value, value);
        }
        panel.push(WatchLineKind::Info, "Waiting for changes...");
        panel
    }

    pub fn scope(&self) -> &WatchScope {
        &self.scope
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn lines(&self) -> &VecDeque<WatchLine> {
        &self.lines
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Apply one update from this panel's subscription.
    ///
    /// Returns `WatchInterrupted` the first time the subscription reports a
    /// failure; later updates are ignored once the stream has ended.
    pub fn apply(&mut self, update: WatchUpdate) -> Option<AppError> {
        if self.ended {
            return None;
        }
        match update {
            WatchUpdate::Event(event) => {
                self.events_seen += 1;
                self.push_event(&event);
                None
            }
            WatchUpdate::Ended { error: None } => {
                self.ended = true;
                self.push(WatchLineKind::Info, "Watch stream closed");
                None
            }
            WatchUpdate::Ended { error: Some(reason) } => {
                self.ended = true;
                self.push(WatchLineKind::Error, format!("Watch error: {}", reason));
                Some(AppError::WatchInterrupted {
                    key: self.scope.to_string(),
                    reason,
                })
            }
        }
    }

    fn push_event(&mut self, event: &WatchEvent) {
        let subject = match self.scope {
            WatchScope::Key(_) => String::new(),
            WatchScope::Prefix(_) => format!(" {}", event.key),
        };
        match event.kind {
            WatchEventKind::Put => {
                self.push(
                    WatchLineKind::Put,
                    format!("► PUT{} (rev {})", subject, event.mod_revision),
                );
                self.push(WatchLineKind::Info, "New value:");
                self.push_block(WatchLineKind::Value, &event.value);
            }
            WatchEventKind::Delete => {
                self.push(
                    WatchLineKind::Delete,
                    format!("► DELETE{} (rev {})", subject, event.mod_revision),
                );
                self.push(WatchLineKind::Info, "Key was deleted");
            }
        }
    }

    fn push_block(&mut self, kind: WatchLineKind, text: &str) {
        if text.is_empty() {
            self.push(kind, "");
            return;
        }
        for line in text.lines() {
            self.push(kind, line);
        }
    }

    fn push(&mut self, kind: WatchLineKind, text: impl Into<String>) {
        self.lines.push_back(WatchLine::new(kind, text));
        while self.lines.len() > self.cap {
            self.lines.pop_front();
        }
        if !self.follow {
            // Keep the viewport anchored on the same lines.
            self.scroll = (self.scroll + 1).min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.follow = false;
        self.scroll = (self.scroll + lines).min(self.lines.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
        if self.scroll == 0 {
            self.follow = true;
        }
    }

    pub fn jump_to_bottom(&mut self) {
        self.scroll = 0;
        self.follow = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn texts(panel: &WatchPanel) -> Vec<&str> {
        panel.lines().iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_panel_banner() {
        let panel = WatchPanel::new(WatchScope::Key("/a".into()), 1, Some("v1"));
        assert_eq!(
            texts(&panel),
            vec![
                "Started watching key: /a",
                "Current value:",
                "v1",
                "Waiting for changes..."
            ]
        );
    }

    #[test]
    fn test_panel_events() {
        let mut panel = WatchPanel::new(WatchScope::Key("/a".into()), 1, None);
        assert!(panel.apply(WatchUpdate::Event(WatchEvent::put("/a", "x\ny", 7))).is_none());
        assert!(panel.apply(WatchUpdate::Event(WatchEvent::delete("/a", 8))).is_none());

        let lines = texts(&panel);
        assert_eq!(
            &lines[2..],
            &[
                "► PUT (rev 7)",
                "New value:",
                "x",
                "y",
                "► DELETE (rev 8)",
                "Key was deleted"
            ]
        );
        assert_eq!(panel.events_seen(), 2);
    }

    #[test]
    fn test_prefix_panel_names_key() {
        let mut panel = WatchPanel::new(WatchScope::Prefix("/svc/".into()), 1, None);
        panel.apply(WatchUpdate::Event(WatchEvent::delete("/svc/a", 3)));
        assert!(texts(&panel).contains(&"► DELETE /svc/a (rev 3)"));
    }

    #[test]
    fn test_interruption_reported_once() {
        let mut panel = WatchPanel::new(WatchScope::Key("/a".into()), 1, None);
        let err = panel.apply(WatchUpdate::Ended {
            error: Some("lost leader".into()),
        });
        assert_eq!(
            err,
            Some(AppError::WatchInterrupted {
                key: "/a".into(),
                reason: "lost leader".into()
            })
        );
        assert!(panel.has_ended());
        assert!(panel
            .apply(WatchUpdate::Ended {
                error: Some("again".into())
            })
            .is_none());
        assert_eq!(texts(&panel).last(), Some(&"Watch error: lost leader"));
    }

    #[test]
    fn test_panel_is_bounded() {
        let mut panel = WatchPanel::new(WatchScope::Key("/a".into()), 1, None);
        for rev in 0..(WATCH_PANEL_CAP as i64) {
            panel.apply(WatchUpdate::Event(WatchEvent::delete("/a", rev)));
        }
        assert_eq!(panel.lines().len(), WATCH_PANEL_CAP);
    }

    #[test]
    fn test_scroll_follow() {
        let mut panel = WatchPanel::new(WatchScope::Key("/a".into()), 1, None);
        panel.scroll_up(1);
        assert!(!panel.follow);
        panel.scroll_down(5);
        assert!(panel.follow);
        assert_eq!(panel.scroll, 0);
    }

    #[tokio::test]
    async fn test_spawned_watch_forwards_tagged_events() {
        let store = Arc::new(InMemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_watch(store.clone(), WatchScope::Key("/k".into()), 4, tx);

        // Keep writing until the subscription is live.
        let msg = loop {
            store.put("/k", "v").await.unwrap();
            match tokio::time::timeout(Duration::from_millis(20), rx.recv()).await {
                Ok(Some(msg)) => break msg,
                _ => continue,
            }
        };
        assert_eq!(msg.generation, 4);
        assert!(matches!(msg.update, WatchUpdate::Event(ref e) if e.key == "/k"));

        handle.cancel();
        // Drain anything sent before the cancel landed.
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await {}
        store.put("/k", "after").await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(late, Err(_) | Ok(None)));
    }
}
