//! Input routing
//!
//! Keys are resolved against a stack of dispatch tables. The bottom table is
//! the browsing table and is never removed; a modal pushes its own table on
//! entry and pops it on exit, which restores the browsing bindings exactly.

use std::collections::BTreeMap;

use crate::session::Mode;

/// Terminal-independent key representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Char(char),
    Ctrl(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

/// Operator commands produced by the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    ShowHelp,
    Search,
    NewKey,
    Edit,
    Delete,
    Watch,
    Refresh,
    SwitchProfile,
    ToggleDebug,
    SwitchPane,
    CursorUp,
    CursorDown,
    PageUp,
    PageDown,
    CursorFirst,
    CursorLast,
    ToggleExpand,
    Collapse,
    Expand,
    CloseModal,
}

/// Outcome of routing one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Command(Command),
    /// Hand the key to the widget owning the active modal.
    Forward(Key),
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMap {
    name: &'static str,
    bindings: BTreeMap<Key, Command>,
    forward_unbound: bool,
}

impl KeyMap {
    pub fn new(name: &'static str, forward_unbound: bool) -> Self {
        Self {
            name,
            bindings: BTreeMap::new(),
            forward_unbound,
        }
    }

    pub fn bind(mut self, key: Key, command: Command) -> Self {
        self.bindings.insert(key, command);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lookup(&self, key: Key) -> Dispatch {
        match self.bindings.get(&key) {
            Some(cmd) => Dispatch::Command(*cmd),
            None if self.forward_unbound => Dispatch::Forward(key),
            None => Dispatch::Ignored,
        }
    }

    /// Browsing shortcuts.
    pub fn browsing() -> Self {
        Self::new("browsing", false)
            .bind(Key::Ctrl('c'), Command::Quit)
            .bind(Key::Char('q'), Command::Quit)
            .bind(Key::Char('?'), Command::ShowHelp)
            .bind(Key::Char('/'), Command::Search)
            .bind(Key::Char('n'), Command::NewKey)
            .bind(Key::Char('e'), Command::Edit)
            .bind(Key::Char('d'), Command::Delete)
            .bind(Key::Char('w'), Command::Watch)
            .bind(Key::Char('r'), Command::Refresh)
            .bind(Key::Char('p'), Command::SwitchProfile)
            .bind(Key::F(1), Command::ToggleDebug)
            .bind(Key::Tab, Command::SwitchPane)
            .bind(Key::Up, Command::CursorUp)
            .bind(Key::Char('k'), Command::CursorUp)
            .bind(Key::Down, Command::CursorDown)
            .bind(Key::Char('j'), Command::CursorDown)
            .bind(Key::PageUp, Command::PageUp)
            .bind(Key::PageDown, Command::PageDown)
            .bind(Key::Home, Command::CursorFirst)
            .bind(Key::Char('g'), Command::CursorFirst)
            .bind(Key::End, Command::CursorLast)
            .bind(Key::Char('G'), Command::CursorLast)
            .bind(Key::Enter, Command::ToggleExpand)
            .bind(Key::Char(' '), Command::ToggleExpand)
            .bind(Key::Left, Command::Collapse)
            .bind(Key::Char('h'), Command::Collapse)
            .bind(Key::Right, Command::Expand)
            .bind(Key::Char('l'), Command::Expand)
    }

    /// Table for a modal mode. Only Esc and the terminate chord are bound;
    /// everything else goes to the modal widget.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Browsing => Self::browsing(),
            Mode::FormActive => Self::modal("form"),
            Mode::ConfirmActive => Self::modal("confirm"),
            Mode::WatchActive => Self::modal("watch"),
            Mode::HelpActive => Self::modal("help")
                .bind(Key::Enter, Command::CloseModal)
                .bind(Key::Char('?'), Command::CloseModal)
                .bind(Key::Char('q'), Command::CloseModal),
        }
    }

    fn modal(name: &'static str) -> Self {
        Self::new(name, true)
            .bind(Key::Ctrl('c'), Command::Quit)
            .bind(Key::Esc, Command::CloseModal)
    }
}

#[derive(Clone, Debug)]
pub struct InputRouter {
    base: KeyMap,
    overlays: Vec<KeyMap>,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            base: KeyMap::browsing(),
            overlays: Vec::new(),
        }
    }

    pub fn push(&mut self, table: KeyMap) {
        tracing::trace!(table = table.name(), depth = self.overlays.len() + 1, "push dispatch table");
        self.overlays.push(table);
    }

    /// Pop the top overlay. The base table cannot be popped.
    pub fn pop(&mut self) -> Option<KeyMap> {
        let popped = self.overlays.pop();
        if let Some(table) = &popped {
            tracing::trace!(table = table.name(), "pop dispatch table");
        }
        popped
    }

    pub fn active(&self) -> &KeyMap {
        self.overlays.last().unwrap_or(&self.base)
    }

    pub fn depth(&self) -> usize {
        self.overlays.len()
    }

    pub fn route(&self, key: Key) -> Dispatch {
        self.active().lookup(key)
    }
}
