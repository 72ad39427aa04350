//! Modal form widget
//!
//! A vertical list of fields followed by a row of buttons. Focus moves with
//! Tab/Shift-Tab; text is edited at the end of the focused field.

use etcdtui_core::config::{self, ConfigError, Profile, TlsProfile};
use etcdtui_core::controller::PutRequest;
use etcdtui_core::input::Key;
use etcdtui_core::model::Entry;

pub const SAVE: &str = "Save";
pub const CANCEL: &str = "Cancel";
pub const SEARCH: &str = "Search";
pub const CLEAR: &str = "Clear";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Enter inserts a newline instead of moving focus.
    Multiline,
    /// Rendered masked.
    Secret,
    Toggle,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub label: &'static str,
    pub kind: FieldKind,
    pub value: String,
    pub checked: bool,
}

impl Field {
    fn text(label: &'static str, value: impl Into<String>) -> Self {
        Self::with_kind(label, FieldKind::Text, value)
    }

    fn with_kind(label: &'static str, kind: FieldKind, value: impl Into<String>) -> Self {
        Self {
            label,
            kind,
            value: value.into(),
            checked: false,
        }
    }

    fn toggle(label: &'static str, checked: bool) -> Self {
        Self {
            label,
            kind: FieldKind::Toggle,
            value: String::new(),
            checked,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormKind {
    Create,
    Edit { original: String },
    Search,
    Profile { original: Option<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormOutcome {
    Pending,
    Button(&'static str),
    Cancel,
}

#[derive(Clone, Debug)]
pub struct Form {
    pub kind: FormKind,
    pub title: String,
    pub fields: Vec<Field>,
    pub buttons: Vec<&'static str>,
    /// Index into fields, then buttons.
    pub focus: usize,
    pub error: Option<String>,
}

impl Form {
    fn new(kind: FormKind, title: impl Into<String>, fields: Vec<Field>, buttons: Vec<&'static str>) -> Self {
        Self {
            kind,
            title: title.into(),
            fields,
            buttons,
            focus: 0,
            error: None,
        }
    }

    pub fn create(prefix: &str) -> Self {
        Self::new(
            FormKind::Create,
            " New Key ",
            vec![
                Field::text("Key", prefix),
                Field::with_kind("Value", FieldKind::Multiline, ""),
            ],
            vec![SAVE, CANCEL],
        )
    }

    pub fn edit(entry: &Entry) -> Self {
        let mut form = Self::new(
            FormKind::Edit {
                original: entry.key.clone(),
            },
            format!(" Edit: {} ", entry.key),
            vec![
                Field::text("Key", entry.key.clone()),
                Field::with_kind("Value", FieldKind::Multiline, entry.value.clone()),
            ],
            vec![SAVE, CANCEL],
        );
        form.focus = 1;
        form
    }

    pub fn search(prefix: &str) -> Self {
        Self::new(
            FormKind::Search,
            " Search by Prefix ",
            vec![Field::text("Prefix", prefix)],
            vec![SEARCH, CLEAR, CANCEL],
        )
    }

    pub fn profile(existing: Option<&Profile>) -> Self {
        let (title, original) = match existing {
            Some(p) => (" Edit Profile ", Some(p.name.clone())),
            None => (" New Profile ", None),
        };
        let tls = existing.and_then(|p| p.tls.clone()).unwrap_or_default();
        let path = |p: &Option<std::path::PathBuf>| {
            p.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        };
        let fields = vec![
            Field::text("Name", existing.map(|p| p.name.clone()).unwrap_or_default()),
            Field::text(
                "Endpoints",
                existing
                    .map(|p| p.endpoints.join(","))
                    .unwrap_or_else(|| "localhost:2379".to_string()),
            ),
            Field::text(
                "Username",
                existing.and_then(|p| p.username.clone()).unwrap_or_default(),
            ),
            Field::with_kind(
                "Password",
                FieldKind::Secret,
                existing.and_then(Profile::decode_password).unwrap_or_default(),
            ),
            Field::toggle("TLS Enabled", tls.enabled),
            Field::text("CA File", path(&tls.ca_file)),
            Field::text("Cert File", path(&tls.cert_file)),
            Field::text("Key File", path(&tls.key_file)),
            Field::toggle("Skip Verify", tls.insecure_skip_verify),
            Field::toggle("Default", existing.is_some_and(|p| p.default)),
        ];
        Self::new(FormKind::Profile { original }, title, fields, vec![SAVE, CANCEL])
    }

    pub fn value(&self, label: &str) -> &str {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
            .unwrap_or("")
    }

    pub fn checked(&self, label: &str) -> bool {
        self.fields.iter().any(|f| f.label == label && f.checked)
    }

    fn slots(&self) -> usize {
        self.fields.len() + self.buttons.len()
    }

    pub fn focused_field(&self) -> Option<&Field> {
        self.fields.get(self.focus)
    }

    pub fn focused_button(&self) -> Option<&'static str> {
        self.focus
            .checked_sub(self.fields.len())
            .and_then(|i| self.buttons.get(i).copied())
    }

    fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.slots();
    }

    fn focus_prev(&mut self) {
        self.focus = (self.focus + self.slots() - 1) % self.slots();
    }

    pub fn handle_key(&mut self, key: Key) -> FormOutcome {
        match key {
            Key::Esc => return FormOutcome::Cancel,
            Key::Ctrl('s') => {
                if let Some(primary) = self.buttons.first().copied() {
                    return FormOutcome::Button(primary);
                }
            }
            Key::Tab | Key::Down => self.focus_next(),
            Key::BackTab | Key::Up => self.focus_prev(),
            Key::Left if self.focused_button().is_some() => {
                if self.focus > self.fields.len() {
                    self.focus -= 1;
                }
            }
            Key::Right if self.focused_button().is_some() => {
                if self.focus + 1 < self.slots() {
                    self.focus += 1;
                }
            }
            Key::Enter => {
                if let Some(button) = self.focused_button() {
                    return FormOutcome::Button(button);
                }
                match self.fields.get_mut(self.focus) {
                    Some(f) if f.kind == FieldKind::Multiline => f.value.push('\n'),
                    Some(f) if f.kind == FieldKind::Toggle => f.checked = !f.checked,
                    _ => self.focus_next(),
                }
            }
            Key::Char(c) => match self.fields.get_mut(self.focus) {
                Some(f) if f.kind == FieldKind::Toggle => {
                    if c == ' ' {
                        f.checked = !f.checked;
                    }
                }
                Some(f) => f.value.push(c),
                None => {}
            },
            Key::Backspace => {
                if let Some(f) = self.fields.get_mut(self.focus) {
                    f.value.pop();
                }
            }
            _ => {}
        }
        FormOutcome::Pending
    }

    /// Key/value write described by a create or edit form.
    pub fn put_request(&self) -> Option<PutRequest> {
        let original = match &self.kind {
            FormKind::Create => None,
            FormKind::Edit { original } => Some(original.clone()),
            _ => return None,
        };
        Some(PutRequest {
            original_key: original,
            key: self.value("Key").to_string(),
            value: self.value("Value").to_string(),
        })
    }

    /// Profile described by a profile form, validated.
    pub fn to_profile(&self) -> Result<Profile, ConfigError> {
        let non_empty = |label: &str| {
            let v = self.value(label).trim();
            (!v.is_empty()).then(|| v.to_string())
        };
        let tls = self.checked("TLS Enabled").then(|| TlsProfile {
            enabled: true,
            ca_file: non_empty("CA File").map(Into::into),
            cert_file: non_empty("Cert File").map(Into::into),
            key_file: non_empty("Key File").map(Into::into),
            insecure_skip_verify: self.checked("Skip Verify"),
        });
        let profile = Profile {
            name: self.value("Name").trim().to_string(),
            endpoints: self
                .value("Endpoints")
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect(),
            username: non_empty("Username"),
            password: non_empty("Password").map(|p| config::encode_password(&p)),
            tls,
            default: self.checked("Default"),
        };
        profile.validate()?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(form: &mut Form, text: &str) {
        for c in text.chars() {
            form.handle_key(Key::Char(c));
        }
    }

    #[test]
    fn test_create_form_submits_request() {
        let mut form = Form::create("/svc/");
        type_text(&mut form, "api");
        form.handle_key(Key::Tab);
        type_text(&mut form, "a");
        form.handle_key(Key::Enter);
        type_text(&mut form, "b");

        assert_eq!(form.handle_key(Key::Ctrl('s')), FormOutcome::Button(SAVE));
        assert_eq!(
            form.put_request(),
            Some(PutRequest::create("/svc/api", "a\nb"))
        );
    }

    #[test]
    fn test_edit_form_keeps_original_key() {
        let mut form = Form::edit(&Entry::new("/old", "v"));
        assert_eq!(form.focused_field().map(|f| f.label), Some("Value"));
        form.handle_key(Key::BackTab);
        form.handle_key(Key::Backspace);
        form.handle_key(Key::Backspace);
        form.handle_key(Key::Backspace);
        type_text(&mut form, "new");

        assert_eq!(form.put_request(), Some(PutRequest::edit("/old", "/new", "v")));
    }

    #[test]
    fn test_buttons_and_cancel() {
        let mut form = Form::search("/");
        form.handle_key(Key::Enter);
        assert_eq!(form.focused_button(), Some(SEARCH));
        form.handle_key(Key::Right);
        assert_eq!(form.handle_key(Key::Enter), FormOutcome::Button(CLEAR));
        form.handle_key(Key::Right);
        form.handle_key(Key::Right);
        assert_eq!(form.focused_button(), Some(CANCEL));
        assert_eq!(form.handle_key(Key::Esc), FormOutcome::Cancel);
        assert!(form.put_request().is_none());
    }

    #[test]
    fn test_profile_form_round_trip() {
        let mut existing = Profile::new("prod", vec!["a:2379".into(), "b:2379".into()]);
        existing.username = Some("admin".into());
        existing.password = Some(config::encode_password("s3cret"));

        let form = Form::profile(Some(&existing));
        assert_eq!(form.value("Endpoints"), "a:2379,b:2379");
        assert_eq!(form.value("Password"), "s3cret");

        let profile = form.to_profile().unwrap();
        assert_eq!(profile.endpoints, existing.endpoints);
        assert_eq!(profile.decode_password().as_deref(), Some("s3cret"));
        assert!(profile.tls.is_none());
    }

    #[test]
    fn test_profile_form_validation() {
        let form = Form::profile(None);
        assert!(matches!(form.to_profile(), Err(ConfigError::ProfileNameRequired)));
    }

    #[test]
    fn test_toggle_field() {
        let mut form = Form::profile(None);
        form.focus = 4;
        form.handle_key(Key::Char(' '));
        assert!(form.checked("TLS Enabled"));
        form.handle_key(Key::Char('x'));
        assert!(form.checked("TLS Enabled"));
    }
}
