//! Terminal input reader
//!
//! crossterm's `event::read` blocks, so keys are read on a plain thread and
//! handed to the UI task over a channel. The UI task can then wait on input
//! and store calls at the same time.

use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use etcdtui_core::input::Key;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key),
    Resize,
}

/// Map a crossterm key press to a terminal-independent [`Key`].
pub fn to_key(ev: KeyEvent) -> Option<Key> {
    if ev.modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = ev.code {
            return Some(Key::Ctrl(c.to_ascii_lowercase()));
        }
    }
    let key = match ev.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        KeyCode::Tab => Key::Tab,
        KeyCode::BackTab => Key::BackTab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::F(n) => Key::F(n),
        _ => return None,
    };
    Some(key)
}

/// Start the reader thread. It exits once the receiver is dropped.
pub fn spawn_reader(tx: mpsc::UnboundedSender<InputEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match event::poll(POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => {
                    if tx.is_closed() {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "terminal poll failed");
                    break;
                }
            }
            let forwarded = match event::read() {
                Ok(CEvent::Key(ev)) if ev.kind == KeyEventKind::Press => match to_key(ev) {
                    Some(key) => tx.send(InputEvent::Key(key)),
                    None => Ok(()),
                },
                Ok(CEvent::Resize(..)) => tx.send(InputEvent::Resize),
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "terminal read failed");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        }
        tracing::debug!("input reader stopped");
    })
}
