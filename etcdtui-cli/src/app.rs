use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;

use etcdtui_core::config::{Config, Profile};
use etcdtui_core::controller::Controller;
use etcdtui_core::debug_log::LogLevel;
use etcdtui_core::input::{Command, Dispatch, Key};
use etcdtui_core::live::WatchMsg;
use etcdtui_core::session::Mode;
use etcdtui_core::store::KvStore;

use crate::backends;
use crate::events::InputEvent;
use crate::form::{self, Form, FormKind, FormOutcome};
use crate::ui;

const PAGE: usize = 10;
const TICK: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Profiles,
    Browser,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Tree,
    Details,
}

#[derive(Clone, Debug, Default)]
pub struct Picker {
    pub selected: usize,
    pub message: Option<(LogLevel, String)>,
    /// Profile awaiting removal confirmation.
    pub confirm_remove: Option<String>,
}

/// Input channel plus keys that arrived while a store call was running.
pub struct Io {
    input: mpsc::UnboundedReceiver<InputEvent>,
    queued: VecDeque<Key>,
}

impl Io {
    pub fn new(input: mpsc::UnboundedReceiver<InputEvent>) -> Self {
        Self {
            input,
            queued: VecDeque::new(),
        }
    }
}

/// Drive `fut` to completion while still reading input. Ctrl+C abandons the
/// call and returns `None`; any other key is queued for later.
async fn guarded<F: Future>(io: &mut Io, fut: F) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Some(out),
            ev = io.input.recv() => match ev {
                Some(InputEvent::Key(Key::Ctrl('c'))) | None => {
                    tracing::info!("store call abandoned on interrupt");
                    return None;
                }
                Some(InputEvent::Key(key)) => io.queued.push_back(key),
                Some(InputEvent::Resize) => {}
            },
        }
    }
}

/// Await a store-bound future through [`guarded`], quitting on interrupt.
macro_rules! guard {
    ($app:expr, $io:expr, $fut:expr) => {
        match guarded($io, $fut).await {
            Some(out) => out,
            None => {
                $app.should_quit = true;
                return;
            }
        }
    };
}

pub struct App {
    pub controller: Controller,
    pub config: Config,
    config_path: PathBuf,
    demo: bool,
    pub screen: Screen,
    pub picker: Picker,
    pub focus: Pane,
    pub show_debug: bool,
    pub details_scroll: u16,
    pub form: Option<Form>,
    /// Delete button focused in the confirmation dialog.
    pub confirm_on_delete: bool,
    /// Rows visible in the tree pane, updated on every draw.
    pub tree_height: usize,
    should_quit: bool,
}

impl App {
    pub fn new(
        controller: Controller,
        config: Config,
        config_path: PathBuf,
        demo: bool,
    ) -> Self {
        let selected = config
            .default_profile()
            .ok()
            .and_then(|d| config.profiles.iter().position(|p| p.name == d.name))
            .unwrap_or(0);
        Self {
            controller,
            config,
            config_path,
            demo,
            screen: Screen::Profiles,
            picker: Picker {
                selected,
                ..Picker::default()
            },
            focus: Pane::Tree,
            show_debug: false,
            details_scroll: 0,
            form: None,
            confirm_on_delete: true,
            tree_height: PAGE,
            should_quit: false,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Connect to `store` and switch to the browser on success.
    pub async fn open(&mut self, store: Arc<dyn KvStore>, profile: &str, io: &mut Io) {
        let connected = guard!(self, io, self.controller.connect(store, profile));
        match connected {
            Ok(_) => {
                self.screen = Screen::Browser;
                self.picker.message = None;
            }
            Err(e) => self.picker.message = Some((LogLevel::Error, e.to_string())),
        }
    }

    pub async fn handle_key(&mut self, key: Key, io: &mut Io) {
        match self.screen {
            Screen::Profiles => self.handle_picker_key(key, io).await,
            Screen::Browser => match self.controller.session().route(key) {
                Dispatch::Command(cmd) => self.run_command(cmd, io).await,
                Dispatch::Forward(key) => self.forward(key, io).await,
                Dispatch::Ignored => {}
            },
        }
        self.sync_modals();
    }

    /// Drop widget state for modals the controller has closed.
    fn sync_modals(&mut self) {
        let mode = self.controller.mode();
        if self.screen == Screen::Browser && mode != Mode::FormActive {
            self.form = None;
        }
        if mode != Mode::ConfirmActive {
            self.confirm_on_delete = true;
        }
    }

    async fn run_command(&mut self, cmd: Command, io: &mut Io) {
        tracing::debug!(?cmd, "command");
        match cmd {
            Command::Quit => self.should_quit = true,
            Command::ShowHelp => {
                let _ = self.controller.show_help();
            }
            Command::Search => {
                if let Ok(prefix) = self.controller.open_search_form() {
                    self.form = Some(Form::search(&prefix));
                }
            }
            Command::NewKey => {
                if let Ok(prefix) = self.controller.open_create_form() {
                    self.form = Some(Form::create(&prefix));
                }
            }
            Command::Edit => {
                if let Ok(entry) = self.controller.open_edit_form() {
                    self.form = Some(Form::edit(&entry));
                }
            }
            Command::Delete => {
                let _ = self.controller.request_delete();
            }
            Command::Watch => {
                let _ = guard!(self, io, self.controller.start_watch());
            }
            Command::Refresh => {
                let _ = guard!(self, io, self.controller.refresh());
            }
            Command::SwitchProfile => {
                if self.demo {
                    self.controller
                        .set_status(LogLevel::Warn, "Profiles are not available in demo mode");
                    return;
                }
                self.controller.disconnect().await;
                self.screen = Screen::Profiles;
            }
            Command::ToggleDebug => self.show_debug = !self.show_debug,
            Command::SwitchPane => {
                self.focus = match self.focus {
                    Pane::Tree => Pane::Details,
                    Pane::Details => Pane::Tree,
                };
            }
            Command::CursorUp => self.move_or_scroll(-1, io).await,
            Command::CursorDown => self.move_or_scroll(1, io).await,
            Command::PageUp => self.move_or_scroll(-(self.tree_height.max(1) as isize), io).await,
            Command::PageDown => self.move_or_scroll(self.tree_height.max(1) as isize, io).await,
            Command::CursorFirst => {
                guard!(self, io, self.controller.cursor_first());
                self.details_scroll = 0;
            }
            Command::CursorLast => {
                guard!(self, io, self.controller.cursor_last());
                self.details_scroll = 0;
            }
            Command::ToggleExpand => guard!(self, io, self.controller.toggle_expand()),
            Command::Collapse => guard!(self, io, self.controller.collapse()),
            Command::Expand => guard!(self, io, self.controller.expand()),
            Command::CloseModal => {
                self.controller.close_modal();
                self.form = None;
            }
        }
    }

    async fn move_or_scroll(&mut self, delta: isize, io: &mut Io) {
        match self.focus {
            Pane::Details => {
                let step = delta.unsigned_abs().min(u16::MAX as usize) as u16;
                self.details_scroll = if delta < 0 {
                    self.details_scroll.saturating_sub(step)
                } else {
                    self.details_scroll.saturating_add(step)
                };
            }
            Pane::Tree => {
                guard!(self, io, self.controller.move_cursor(delta));
                self.details_scroll = 0;
            }
        }
    }

    async fn forward(&mut self, key: Key, io: &mut Io) {
        match self.controller.mode() {
            Mode::FormActive => self.forward_to_form(key, io).await,
            Mode::ConfirmActive => match key {
                Key::Left | Key::Right | Key::Tab | Key::BackTab => {
                    self.confirm_on_delete = !self.confirm_on_delete;
                }
                Key::Enter if self.confirm_on_delete => self.confirm_delete(io).await,
                Key::Char('y') | Key::Char('Y') => self.confirm_delete(io).await,
                Key::Enter | Key::Char('n') | Key::Char('N') => self.controller.close_modal(),
                _ => {}
            },
            Mode::WatchActive => {
                let Some(panel) = self.controller.watch_panel_mut() else {
                    return;
                };
                match key {
                    Key::Up | Key::Char('k') => panel.scroll_up(1),
                    Key::Down | Key::Char('j') => panel.scroll_down(1),
                    Key::PageUp => panel.scroll_up(PAGE),
                    Key::PageDown => panel.scroll_down(PAGE),
                    Key::End | Key::Char('G') => panel.jump_to_bottom(),
                    _ => {}
                }
            }
            Mode::HelpActive | Mode::Browsing => {}
        }
    }

    async fn confirm_delete(&mut self, io: &mut Io) {
        let _ = guard!(self, io, self.controller.confirm_delete());
    }

    async fn forward_to_form(&mut self, key: Key, io: &mut Io) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        let outcome = form.handle_key(key);
        let kind = form.kind.clone();
        let request = form.put_request();
        let prefix = form.value("Prefix").to_string();

        match (outcome, kind) {
            (FormOutcome::Pending, _) => {}
            (FormOutcome::Cancel, _) | (FormOutcome::Button(form::CANCEL), _) => {
                self.controller.close_modal();
            }
            (FormOutcome::Button(form::SEARCH), FormKind::Search) => {
                let _ = guard!(self, io, self.controller.search(prefix.trim()));
            }
            (FormOutcome::Button(form::CLEAR), FormKind::Search) => {
                let _ = guard!(self, io, self.controller.clear_search());
            }
            (FormOutcome::Button(form::SAVE), _) => {
                let Some(request) = request else { return };
                let result = guard!(self, io, self.controller.put(request));
                if let (Err(e), Some(form)) = (result, self.form.as_mut()) {
                    form.error = Some(e.to_string());
                }
            }
            (FormOutcome::Button(other), _) => {
                tracing::warn!(button = other, "unhandled form button");
            }
        }
    }

    // Profile picker

    fn selected_profile(&self) -> Option<&Profile> {
        self.config.profiles.get(self.picker.selected)
    }

    fn save_config(&mut self) {
        match self.config.save(&self.config_path) {
            Ok(()) => {
                tracing::info!(path = %self.config_path.display(), "config saved");
            }
            Err(e) => {
                self.picker.message = Some((LogLevel::Error, format!("Failed to save config: {}", e)));
            }
        }
    }

    async fn handle_picker_key(&mut self, key: Key, io: &mut Io) {
        if let Some(form) = self.form.as_mut() {
            match form.handle_key(key) {
                FormOutcome::Pending => {}
                FormOutcome::Cancel | FormOutcome::Button(form::CANCEL) => self.form = None,
                FormOutcome::Button(_) => self.submit_profile_form(),
            }
            return;
        }

        if let Some(name) = self.picker.confirm_remove.take() {
            if matches!(key, Key::Char('y') | Key::Char('Y') | Key::Enter) {
                match self.config.remove_profile(&name) {
                    Ok(_) => {
                        self.picker.message = Some((LogLevel::Info, format!("Removed profile {}", name)));
                        self.save_config();
                    }
                    Err(e) => self.picker.message = Some((LogLevel::Error, e.to_string())),
                }
                let last = self.config.profiles.len().saturating_sub(1);
                self.picker.selected = self.picker.selected.min(last);
            }
            return;
        }

        let count = self.config.profiles.len();
        match key {
            Key::Char('q') | Key::Esc | Key::Ctrl('c') => self.should_quit = true,
            Key::Up | Key::Char('k') => self.picker.selected = self.picker.selected.saturating_sub(1),
            Key::Down | Key::Char('j') => {
                if self.picker.selected + 1 < count {
                    self.picker.selected += 1;
                }
            }
            Key::Char('n') => self.form = Some(Form::profile(None)),
            Key::Char('e') => {
                if let Some(p) = self.selected_profile() {
                    self.form = Some(Form::profile(Some(p)));
                }
            }
            Key::Char('d') => {
                self.picker.confirm_remove = self.selected_profile().map(|p| p.name.clone());
            }
            Key::Char('s') => {
                let Some(name) = self.selected_profile().map(|p| p.name.clone()) else {
                    return;
                };
                if let Err(e) = self.config.set_default(&name) {
                    self.picker.message = Some((LogLevel::Error, e.to_string()));
                    return;
                }
                self.picker.message = Some((LogLevel::Info, format!("{} is now the default profile", name)));
                self.save_config();
            }
            Key::Enter => {
                let Some(profile) = self.selected_profile().cloned() else {
                    return;
                };
                self.connect_profile(&profile, io).await;
            }
            _ => {}
        }
    }

    pub async fn connect_profile(&mut self, profile: &Profile, io: &mut Io) {
        self.picker.message = Some((LogLevel::Info, format!("Connecting to {}...", profile.name)));
        self.controller
            .debug_mut()
            .info(format!("Opening client for {}", profile.display_string()));
        let opened = guard!(self, io, backends::open_store(profile));
        match opened {
            Ok(store) => self.open(store, &profile.name, io).await,
            Err(e) => {
                self.controller
                    .debug_mut()
                    .error(format!("Failed to open {}: {}", profile.name, e));
                self.picker.message = Some((LogLevel::Error, e.to_string()));
            }
        }
    }

    fn submit_profile_form(&mut self) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        let FormKind::Profile { original } = form.kind.clone() else {
            return;
        };
        let profile = match form.to_profile() {
            Ok(p) => p,
            Err(e) => {
                form.error = Some(e.to_string());
                return;
            }
        };
        let name = profile.name.clone();
        if let Some(old) = original.filter(|old| *old != name) {
            let _ = self.config.remove_profile(&old);
        }
        if let Err(e) = self.config.add_profile(profile) {
            form.error = Some(e.to_string());
            return;
        }
        self.form = None;
        self.picker.selected = self
            .config
            .profiles
            .iter()
            .position(|p| p.name == name)
            .unwrap_or(0);
        self.picker.message = Some((LogLevel::Info, format!("Saved profile {}", name)));
        self.save_config();
    }
}

/// Main loop: draw, then wait for a key, a watch message or the tick.
pub async fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    io: &mut Io,
    watch_rx: &mut mpsc::UnboundedReceiver<WatchMsg>,
) -> io::Result<()> {
    let mut tick = tokio::time::interval(TICK);

    while !app.should_quit() {
        terminal.draw(|f| ui::render::draw(f, app))?;

        if let Some(key) = io.queued.pop_front() {
            app.handle_key(key, io).await;
            continue;
        }

        tokio::select! {
            ev = io.input.recv() => match ev {
                Some(InputEvent::Key(key)) => app.handle_key(key, io).await,
                Some(InputEvent::Resize) => {}
                None => {
                    tracing::warn!("input channel closed");
                    break;
                }
            },
            Some(msg) = watch_rx.recv() => {
                app.controller.apply_watch_msg(msg);
                while let Ok(msg) = watch_rx.try_recv() {
                    app.controller.apply_watch_msg(msg);
                }
            }
            _ = tick.tick() => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use etcdtui_core::connection::ConnectionManager;
    use etcdtui_core::store::InMemoryStore;

    fn setup(config: Config) -> (App, Io, mpsc::UnboundedSender<InputEvent>, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let (watch_tx, _watch_rx) = mpsc::unbounded_channel();
        let controller = Controller::new(ConnectionManager::new(), watch_tx);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let app = App::new(controller, config, path.clone(), false);
        (app, Io::new(input_rx), input_tx, path, dir)
    }

    async fn browser() -> (App, Io, mpsc::UnboundedSender<InputEvent>, tempfile::TempDir) {
        let (mut app, mut io, tx, _, dir) = setup(Config::default());
        let store = InMemoryStore::with_entries([("/a/x", "1"), ("/a/y", "2"), ("/b", "3")]).await;
        app.open(Arc::new(store), "test", &mut io).await;
        assert_eq!(app.screen, Screen::Browser);
        (app, io, tx, dir)
    }

    async fn press(app: &mut App, io: &mut Io, keys: &[Key]) {
        for key in keys {
            app.handle_key(*key, io).await;
        }
    }

    fn chars(text: &str) -> Vec<Key> {
        text.chars().map(Key::Char).collect()
    }

    #[tokio::test]
    async fn test_create_key_through_form() {
        let (mut app, mut io, _tx, _dir) = browser().await;
        press(&mut app, &mut io, &[Key::Char('n')]).await;
        assert_eq!(app.controller.mode(), Mode::FormActive);
        assert!(app.form.is_some());

        // Cursor starts on the /a directory, so the key is prefilled with "/a/".
        let mut keys = chars("c");
        keys.push(Key::Tab);
        keys.extend(chars("v"));
        keys.push(Key::Ctrl('s'));
        press(&mut app, &mut io, &keys).await;

        assert_eq!(app.controller.mode(), Mode::Browsing);
        assert!(app.form.is_none());
        assert_eq!(app.controller.session().selected().map(|e| e.key.as_str()), Some("/a/c"));
    }

    #[tokio::test]
    async fn test_form_swallows_browsing_shortcuts() {
        let (mut app, mut io, _tx, _dir) = browser().await;
        press(&mut app, &mut io, &[Key::Char('/')]).await;
        press(&mut app, &mut io, &chars("qd")).await;

        assert!(!app.should_quit());
        assert_eq!(app.controller.mode(), Mode::FormActive);
        assert_eq!(app.form.as_ref().map(|f| f.value("Prefix")), Some("/qd"));

        press(&mut app, &mut io, &[Key::Esc]).await;
        assert_eq!(app.controller.mode(), Mode::Browsing);
        assert!(app.form.is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let (mut app, mut io, _tx, _dir) = browser().await;
        // Row order: /a, /b
        press(&mut app, &mut io, &[Key::Down, Key::Char('d')]).await;
        assert_eq!(app.controller.mode(), Mode::ConfirmActive);

        press(&mut app, &mut io, &[Key::Char('n')]).await;
        assert_eq!(app.controller.mode(), Mode::Browsing);
        assert!(app.controller.tree().find("/b").is_some());

        press(&mut app, &mut io, &[Key::Char('d'), Key::Enter]).await;
        assert!(app.controller.tree().find("/b").is_none());
    }

    #[tokio::test]
    async fn test_interrupt_during_store_call() {
        let (_app, mut io, tx, _path, _dir) = setup(Config::default());
        tx.send(InputEvent::Key(Key::Char('x'))).unwrap();
        tx.send(InputEvent::Key(Key::Ctrl('c'))).unwrap();

        let out = guarded(&mut io, std::future::pending::<()>()).await;
        assert!(out.is_none());
        assert_eq!(io.queued, VecDeque::from([Key::Char('x')]));
    }

    #[tokio::test]
    async fn test_picker_adds_and_saves_profile() {
        let (mut app, mut io, _tx, path, _dir) = setup(Config::default());
        press(&mut app, &mut io, &[Key::Char('n')]).await;
        let mut keys = chars("staging");
        keys.push(Key::Ctrl('s'));
        press(&mut app, &mut io, &keys).await;

        assert!(app.form.is_none());
        assert_eq!(app.config.profiles.len(), 1);
        let saved = Config::load(&path).unwrap();
        assert_eq!(saved.profiles[0].name, "staging");
        assert_eq!(saved.profiles[0].endpoints, vec!["localhost:2379".to_string()]);
    }

    #[tokio::test]
    async fn test_picker_remove_needs_confirmation() {
        let (mut app, mut io, _tx, _path, _dir) = setup(Config::with_local_profile());
        press(&mut app, &mut io, &[Key::Char('d'), Key::Char('n')]).await;
        assert_eq!(app.config.profiles.len(), 1);
        press(&mut app, &mut io, &[Key::Char('d'), Key::Char('y')]).await;
        assert!(app.config.profiles.is_empty());
    }
}
