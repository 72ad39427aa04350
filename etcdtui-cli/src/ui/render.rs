use std::time::SystemTime;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use etcdtui_core::controller::{Details, LeaseInfo};
use etcdtui_core::session::Mode;

use crate::app::{App, Pane, Screen};
use crate::form::{FieldKind, Form};
use crate::ui::styles;

const DEBUG_PANE_HEIGHT: u16 = 8;

/// Format a SystemTime as HH:MM:SS for the debug pane
pub fn format_timestamp(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            let hours = (secs / 3600) % 24;
            let minutes = (secs / 60) % 60;
            let seconds = secs % 60;
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

pub fn fit_title(s: &str, width: u16) -> String {
    // width includes borders; keep safe margin
    let max = width.saturating_sub(4) as usize;
    if max == 0 {
        return "".into();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max {
        return s.to_string();
    }
    if max <= 1 {
        return "…".into();
    }
    let mut out: String = chars.into_iter().take(max - 1).collect();
    out.push('…');
    out
}

/// Rect of at most `width` x `height` centered in `area`.
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn modal_block(title: &str, width: u16) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(fit_title(title, width))
}

pub fn draw(f: &mut Frame, app: &mut App) {
    match app.screen {
        Screen::Profiles => draw_profiles(f, app),
        Screen::Browser => draw_browser(f, app),
    }
}

// Profiles screen

fn draw_profiles(f: &mut Frame, app: &App) {
    let area = f.area();
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let items: Vec<ListItem> = app
        .config
        .profiles
        .iter()
        .map(|p| {
            let marker = if p.default { "★ " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, styles::accent()),
                Span::styled(p.display_string(), styles::text()),
            ]))
        })
        .collect();
    let empty = items.is_empty();
    let mut state = ListState::default();
    if !empty {
        state.select(Some(app.picker.selected));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(true))
        .title(" etcdtui - Select Profile ");
    if empty {
        let hint = Paragraph::new("No profiles configured. Press n to create one.")
            .style(styles::text_dim())
            .block(block);
        f.render_widget(hint, parts[0]);
    } else {
        let list = List::new(items)
            .block(block)
            .highlight_style(styles::selection());
        f.render_stateful_widget(list, parts[0], &mut state);
    }

    let message = match &app.picker.message {
        Some((level, text)) => Line::from(Span::styled(text.clone(), styles::level(*level))),
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(message), parts[1]);
    f.render_widget(Paragraph::new(key_hints(PICKER_HINTS)), parts[2]);

    if let Some(name) = &app.picker.confirm_remove {
        let rect = centered(area, 50, 5);
        f.render_widget(Clear, rect);
        let block = modal_block(" Remove Profile ", rect.width);
        let text = vec![
            Line::from(Span::styled(format!("Remove profile {}?", name), styles::text())),
            Line::from(""),
            key_hints(&[("y", "remove"), ("n", "keep")]),
        ];
        f.render_widget(Paragraph::new(text).block(block), rect);
    }

    if let Some(form) = &app.form {
        draw_form(f, form);
    }
}

const PICKER_HINTS: &[(&str, &str)] = &[
    ("Enter", "connect"),
    ("n", "new"),
    ("e", "edit"),
    ("d", "delete"),
    ("s", "set default"),
    ("q", "quit"),
];

fn key_hints(hints: &[(&str, &str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), styles::key_hint()));
        spans.push(Span::styled(format!("{} ", label), styles::text_muted()));
    }
    Line::from(spans)
}

// Browser screen

fn draw_browser(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let debug_height = if app.show_debug { DEBUG_PANE_HEIGHT } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(debug_height),
            Constraint::Length(1),
        ])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    draw_tree(f, app, panes[0]);
    draw_details(f, app, panes[1]);
    if app.show_debug {
        draw_debug(f, app, rows[1]);
    }
    draw_status(f, app, rows[2]);

    match app.controller.mode() {
        Mode::Browsing => {}
        Mode::FormActive => {
            if let Some(form) = &app.form {
                draw_form(f, form);
            }
        }
        Mode::ConfirmActive => draw_confirm(f, app),
        Mode::WatchActive => draw_watch(f, app),
        Mode::HelpActive => draw_help(f),
    }
}

fn draw_tree(f: &mut Frame, app: &mut App, area: Rect) {
    app.tree_height = area.height.saturating_sub(2) as usize;

    let rows = app.controller.rows();
    let cursor = app.controller.view().cursor_index(&rows);
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth);
            let marker = match (row.has_children, row.expanded) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                (false, _) => "  ",
            };
            let name_style = if row.has_children {
                styles::directory()
            } else {
                styles::text()
            };
            let mut spans = vec![
                Span::raw(indent),
                Span::styled(marker, styles::text_dim()),
                Span::styled(row.name.clone(), name_style),
            ];
            // A directory that is also a key.
            if row.has_children && row.has_entry {
                spans.push(Span::styled(" •", styles::accent()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = match app.controller.filter() {
        Some(prefix) => format!(" Keys [{}] ", prefix),
        None => " Keys ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(app.focus == Pane::Tree))
        .title(fit_title(&title, area.width));

    if items.is_empty() {
        let empty = if app.controller.is_connected() {
            "No keys"
        } else {
            "Not connected"
        };
        f.render_widget(
            Paragraph::new(Span::styled(empty, styles::text_muted())).block(block),
            area,
        );
        return;
    }

    let mut state = ListState::default();
    state.select(cursor);
    let list = List::new(items)
        .block(block)
        .highlight_style(styles::selection());
    f.render_stateful_widget(list, area, &mut state);
}

/// Text of the details pane.
pub fn details_lines(details: &Details) -> Vec<Line<'static>> {
    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{}: ", label), styles::text_dim()),
            Span::styled(value, styles::text()),
        ])
    };

    match details {
        Details::Empty => vec![Line::from(Span::styled(
            "Select a key to view details",
            styles::text_muted(),
        ))],
        Details::Directory { path, children } => vec![
            Line::from(Span::styled("Directory", styles::section_header())),
            Line::from(""),
            field("Path", path.clone()),
            field("Children", children.to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Select a key to view details",
                styles::text_muted(),
            )),
        ],
        Details::SearchResults { prefix, count } => vec![
            Line::from(Span::styled(
                format!("Search results for: {}", prefix),
                styles::info(),
            )),
            Line::from(""),
            Line::from(Span::styled(format!("{} keys found", count), styles::text())),
        ],
        Details::Entry { entry, lease } => {
            let mut lines = vec![
                field("Key", entry.key.clone()),
                Line::from(""),
                Line::from(Span::styled("Value:", styles::text_dim())),
            ];
            lines.extend(
                entry
                    .value
                    .lines()
                    .map(|l| Line::from(Span::styled(l.to_string(), styles::text()))),
            );
            lines.push(Line::from(""));
            lines.push(field("Create Revision", entry.create_revision.to_string()));
            lines.push(field("Mod Revision", entry.mod_revision.to_string()));
            lines.push(field("Version", entry.version.to_string()));
            match lease {
                LeaseInfo::None => lines.push(field("TTL", "∞".to_string())),
                LeaseInfo::Ttl(ttl) => {
                    lines.push(field("TTL", format!("{} seconds", ttl)));
                    lines.push(field("Lease", format!("{:x}", entry.lease)));
                }
                LeaseInfo::Unknown(id) => {
                    lines.push(field("TTL", "unknown".to_string()));
                    lines.push(field("Lease", format!("{:x}", id)));
                }
            }
            lines
        }
    }
}

fn draw_details(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(app.focus == Pane::Details))
        .title(" Details ");
    let text = Paragraph::new(details_lines(app.controller.details()))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.details_scroll, 0));
    f.render_widget(text, area);
}

fn draw_debug(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .controller
        .debug()
        .tail(visible)
        .map(|r| {
            Line::from(vec![
                Span::styled(format!("{} ", format_timestamp(r.at)), styles::text_muted()),
                Span::styled(format!("{:<5} ", r.level.to_string()), styles::level(r.level)),
                Span::styled(r.text.clone(), styles::text()),
            ])
        })
        .collect();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(false))
        .title(" Debug (F1) ");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// One-line status bar text when no message is pending.
pub fn summary_text(app: &App) -> String {
    if !app.controller.is_connected() {
        return "Not connected".to_string();
    }
    let profile = app.controller.profile().unwrap_or("?");
    match app.controller.summary() {
        Some(s) => format!("{} | Leader: {} | Keys: {}", profile, s.leader, s.keys),
        None => profile.to_string(),
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let line = match app.controller.status() {
        Some(status) => Line::from(Span::styled(status.text.clone(), styles::level(status.level))),
        None => {
            let mut spans = vec![
                Span::styled(" ● ", if app.controller.is_connected() {
                    styles::success()
                } else {
                    styles::error()
                }),
                Span::styled(summary_text(app), styles::text()),
                Span::raw(" |"),
            ];
            spans.extend(key_hints(BROWSER_HINTS).spans);
            Line::from(spans)
        }
    };
    f.render_widget(Paragraph::new(line), area);
}

const BROWSER_HINTS: &[(&str, &str)] = &[
    ("/", "Search"),
    ("n", "New"),
    ("r", "Refresh"),
    ("q", "Quit"),
    ("?", "Help"),
];

// Modals

fn field_lines(field: &crate::form::Field, focused: bool) -> Vec<Line<'static>> {
    let label_style = if focused {
        styles::accent()
    } else {
        styles::text_dim()
    };
    let cursor = if focused { "█" } else { "" };
    match field.kind {
        FieldKind::Toggle => {
            let mark = if field.checked { "[x]" } else { "[ ]" };
            vec![Line::from(vec![
                Span::styled(format!("{} ", mark), label_style),
                Span::styled(field.label.to_string(), label_style),
            ])]
        }
        FieldKind::Secret => vec![
            Line::from(Span::styled(format!("{}:", field.label), label_style)),
            Line::from(Span::styled(
                format!("  {}{}", "*".repeat(field.value.chars().count()), cursor),
                styles::text(),
            )),
        ],
        FieldKind::Text => vec![
            Line::from(Span::styled(format!("{}:", field.label), label_style)),
            Line::from(Span::styled(format!("  {}{}", field.value, cursor), styles::text())),
        ],
        FieldKind::Multiline => {
            let mut lines = vec![Line::from(Span::styled(
                format!("{}:", field.label),
                label_style,
            ))];
            let value_lines: Vec<&str> = field.value.split('\n').collect();
            let last = value_lines.len() - 1;
            for (i, l) in value_lines.iter().enumerate() {
                let tail = if i == last { cursor } else { "" };
                lines.push(Line::from(Span::styled(format!("  {}{}", l, tail), styles::text())));
            }
            lines
        }
    }
}

fn draw_form(f: &mut Frame, form: &Form) {
    let mut lines = Vec::new();
    for (i, field) in form.fields.iter().enumerate() {
        lines.extend(field_lines(field, form.focus == i));
    }
    lines.push(Line::from(""));

    let focused_button = form.focused_button();
    let mut buttons = Vec::new();
    for label in &form.buttons {
        let style = if focused_button == Some(*label) {
            styles::selection()
        } else {
            styles::text_dim()
        };
        buttons.push(Span::styled(format!("[ {} ]", label), style));
        buttons.push(Span::raw("  "));
    }
    lines.push(Line::from(buttons));
    if let Some(err) = &form.error {
        lines.push(Line::from(Span::styled(err.clone(), styles::error())));
    }
    lines.push(key_hints(&[("Tab", "next"), ("Ctrl+S", "submit"), ("Esc", "cancel")]));

    let area = f.area();
    let height = lines.len() as u16 + 2;
    let rect = centered(area, 70, height);
    f.render_widget(Clear, rect);
    let block = modal_block(&form.title, rect.width);
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        rect,
    );
}

fn draw_confirm(f: &mut Frame, app: &App) {
    let key = app.controller.pending_delete().unwrap_or("");
    let button = |label: &str, focused: bool| {
        let style = if focused {
            styles::selection()
        } else {
            styles::text_dim()
        };
        Span::styled(format!("[ {} ]", label), style)
    };
    let lines = vec![
        Line::from(Span::styled(format!("Delete key: {}?", key), styles::warn())),
        Line::from(""),
        Line::from(vec![
            button("Delete", app.confirm_on_delete),
            Span::raw("  "),
            button("Cancel", !app.confirm_on_delete),
        ]),
    ];
    let rect = centered(f.area(), 60, 5);
    f.render_widget(Clear, rect);
    let block = modal_block(" Confirm Delete ", rect.width);
    f.render_widget(Paragraph::new(lines).block(block), rect);
}

fn draw_watch(f: &mut Frame, app: &App) {
    let Some(panel) = app.controller.watch_panel() else {
        return;
    };
    let area = f.area();
    let rect = centered(area, area.width.saturating_sub(8), area.height.saturating_sub(4));
    f.render_widget(Clear, rect);

    let mut title = format!(" Watch: {} ({} events) ", panel.scope(), panel.events_seen());
    if panel.has_ended() {
        title.push_str("[ended] ");
    }
    let block = modal_block(&title, rect.width);
    let inner = block.inner(rect);
    f.render_widget(block, rect);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let height = parts[0].height as usize;
    let total = panel.lines().len();
    let end = total.saturating_sub(panel.scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = panel
        .lines()
        .iter()
        .skip(start)
        .take(end - start)
        .map(|l| Line::from(Span::styled(l.text.clone(), styles::watch_line(l.kind))))
        .collect();
    f.render_widget(Paragraph::new(lines), parts[0]);

    let mut hints = key_hints(&[("Esc", "close"), ("↑↓", "scroll"), ("G", "follow")]);
    if !panel.follow {
        hints.spans.push(Span::styled("(paused)", styles::warn()));
    }
    f.render_widget(Paragraph::new(hints), parts[1]);
}

const HELP: &[(&str, &[(&str, &str)])] = &[
    (
        "NAVIGATION",
        &[
            ("↑/k ↓/j", "Move up / down"),
            ("PgUp/PgDn", "Page up / down"),
            ("g/G", "First / last"),
            ("Enter/Space", "Expand / collapse"),
            ("←/h →/l", "Collapse / expand"),
            ("Tab", "Switch pane"),
        ],
    ),
    (
        "ACTIONS",
        &[
            ("n", "New key"),
            ("e", "Edit selected key"),
            ("d", "Delete selected key"),
            ("w", "Watch key or directory"),
            ("/", "Search by prefix"),
            ("r", "Refresh"),
        ],
    ),
    (
        "GENERAL",
        &[
            ("p", "Switch profile"),
            ("F1", "Toggle debug log"),
            ("?", "Toggle this help"),
            ("q / Ctrl+C", "Quit"),
        ],
    ),
];

fn draw_help(f: &mut Frame) {
    let mut lines = Vec::new();
    for (i, (section, keys)) in HELP.iter().enumerate() {
        if i > 0 {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(*section, styles::section_header())));
        for (key, label) in keys.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:<13}", key), styles::key_hint()),
                Span::styled(*label, styles::text()),
            ]));
        }
    }
    let rect = centered(f.area(), 56, lines.len() as u16 + 2);
    f.render_widget(Clear, rect);
    let block = modal_block(" Help - Press ? or Esc to close ", rect.width);
    f.render_widget(Paragraph::new(lines).block(block), rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use etcdtui_core::model::Entry;
    use std::time::Duration;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_fit_title() {
        assert_eq!(fit_title(" Keys ", 40), " Keys ");
        assert_eq!(fit_title("abcdefghij", 8), "abc…");
        assert_eq!(fit_title("abc", 4), "");
    }

    #[test]
    fn test_format_timestamp() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(3600 * 25 + 61);
        assert_eq!(format_timestamp(t), "01:01:01");
    }

    #[test]
    fn test_centered_clamps() {
        let area = Rect::new(0, 0, 100, 20);
        assert_eq!(centered(area, 40, 10), Rect::new(30, 5, 40, 10));
        assert_eq!(centered(area, 200, 50), area);
    }

    #[test]
    fn test_entry_details() {
        let entry = Entry::new("/locks/a", "one\ntwo")
            .with_revisions(3, 7, 2)
            .with_lease(0x1f);
        let lines = plain(&details_lines(&Details::Entry {
            entry,
            lease: LeaseInfo::Ttl(42),
        }));
        assert_eq!(lines[0], "Key: /locks/a");
        assert_eq!(lines[3], "one");
        assert_eq!(lines[4], "two");
        assert!(lines.contains(&"Mod Revision: 7".to_string()));
        assert!(lines.contains(&"TTL: 42 seconds".to_string()));
        assert!(lines.contains(&"Lease: 1f".to_string()));
    }

    #[test]
    fn test_search_details() {
        let lines = plain(&details_lines(&Details::SearchResults {
            prefix: "/svc".into(),
            count: 2,
        }));
        assert_eq!(lines, vec!["Search results for: /svc", "", "2 keys found"]);
    }
}
