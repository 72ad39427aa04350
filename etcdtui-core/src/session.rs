use crate::error::AppError;
use crate::input::{Dispatch, InputRouter, Key, KeyMap};
use crate::live::WatchHandle;
use crate::model::Entry;

/// Exclusive interaction state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Browsing,
    FormActive,
    ConfirmActive,
    WatchActive,
    HelpActive,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Browsing => "browser",
            Mode::FormActive => "form",
            Mode::ConfirmActive => "confirmation",
            Mode::WatchActive => "watch panel",
            Mode::HelpActive => "help",
        }
    }

    pub fn is_modal(&self) -> bool {
        !matches!(self, Mode::Browsing)
    }
}

/// Selection, mode and watch subscription of one connected session.
///
/// The selection is held by value. A rebuilt tree does not invalidate it;
/// the controller replaces or clears it after each refresh.
#[derive(Debug, Default)]
pub struct Session {
    selected: Option<Entry>,
    mode: Mode,
    watch: Option<WatchHandle>,
    router: InputRouter,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&Entry> {
        self.selected.as_ref()
    }

    pub fn select_entry(&mut self, entry: Entry) {
        self.selected = Some(entry);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Enter `mode`, switching the router to that mode's dispatch table.
    ///
    /// Entering a modal mode while another is active is rejected and leaves
    /// everything unchanged. Entering `Browsing` is the same as `exit_mode`.
    pub fn enter_mode(&mut self, mode: Mode) -> Result<(), AppError> {
        if !mode.is_modal() {
            self.exit_mode();
            return Ok(());
        }
        if self.mode.is_modal() {
            tracing::debug!(active = ?self.mode, requested = ?mode, "mode change rejected");
            return Err(AppError::AlreadyActive { active: self.mode });
        }
        self.router.push(KeyMap::for_mode(mode));
        self.mode = mode;
        tracing::debug!(?mode, "entered mode");
        Ok(())
    }

    /// Return to `Browsing`, restoring the browsing dispatch table.
    /// Returns the mode that was left.
    pub fn exit_mode(&mut self) -> Mode {
        let previous = self.mode;
        if previous.is_modal() {
            self.router.pop();
            self.mode = Mode::Browsing;
            tracing::debug!(mode = ?previous, "left mode");
        }
        previous
    }

    /// Install a new watch subscription, cancelling any previous one first.
    pub fn set_watch(&mut self, handle: WatchHandle) {
        self.cancel_watch();
        self.watch = Some(handle);
    }

    /// Cancel the active watch, if any. Safe to call repeatedly.
    pub fn cancel_watch(&mut self) -> bool {
        match self.watch.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn watch(&self) -> Option<&WatchHandle> {
        self.watch.as_ref()
    }

    pub fn has_watch(&self) -> bool {
        self.watch.is_some()
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn route(&self, key: Key) -> Dispatch {
        self.router.route(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Command;

    #[test]
    fn test_cancel_watch_idempotent() {
        let mut session = Session::new();
        for _ in 0..5 {
            assert!(!session.cancel_watch());
            assert!(!session.has_watch());
        }
    }

    #[test]
    fn test_second_modal_rejected() {
        let mut session = Session::new();
        session.enter_mode(Mode::ConfirmActive).unwrap();

        let err = session.enter_mode(Mode::FormActive).unwrap_err();
        assert_eq!(
            err,
            AppError::AlreadyActive {
                active: Mode::ConfirmActive
            }
        );
        assert_eq!(session.mode(), Mode::ConfirmActive);
        assert_eq!(session.router().depth(), 1);
    }

    #[test]
    fn test_exit_restores_browsing_dispatch() {
        let mut session = Session::new();
        assert_eq!(session.route(Key::Char('e')), Dispatch::Command(Command::Edit));

        session.enter_mode(Mode::FormActive).unwrap();
        assert_eq!(session.route(Key::Char('e')), Dispatch::Forward(Key::Char('e')));

        assert_eq!(session.exit_mode(), Mode::FormActive);
        assert_eq!(session.mode(), Mode::Browsing);
        assert_eq!(session.route(Key::Char('e')), Dispatch::Command(Command::Edit));
        assert_eq!(session.router().depth(), 0);
    }

    #[test]
    fn test_enter_browsing_is_exit() {
        let mut session = Session::new();
        session.enter_mode(Mode::WatchActive).unwrap();
        session.enter_mode(Mode::Browsing).unwrap();
        assert_eq!(session.mode(), Mode::Browsing);
        assert_eq!(session.exit_mode(), Mode::Browsing);
        assert_eq!(session.router().depth(), 0);
    }

    #[test]
    fn test_selection() {
        let mut session = Session::new();
        session.select_entry(Entry::new("/a", "1"));
        assert_eq!(session.selected().map(|e| e.key.as_str()), Some("/a"));
        session.clear_selection();
        assert!(session.selected().is_none());
    }
}
