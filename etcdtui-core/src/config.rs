use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_DIR: &str = "etcdtui";
pub const CONFIG_FILE: &str = "config.yaml";
/// Overrides the config file location.
pub const CONFIG_ENV: &str = "ETCDTUI_CONFIG";

const PASSWORD_PREFIX: &str = "base64:";

/// TLS settings of a profile
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsProfile {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Skip server certificate verification
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_skip_verify: bool,
}

/// Named connection settings for one etcd cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    pub name: String,

    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Stored as `base64:ENCODED` or plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsProfile>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Profile {
    pub fn new(name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoints,
            ..Default::default()
        }
    }

    /// Plain-text password. A `base64:` value that fails to decode is
    /// returned unchanged.
    pub fn decode_password(&self) -> Option<String> {
        let raw = self.password.as_deref().filter(|p| !p.is_empty())?;
        match raw.strip_prefix(PASSWORD_PREFIX) {
            Some(encoded) => match STANDARD.decode(encoded) {
                Ok(bytes) => Some(String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string())),
                Err(_) => Some(raw.to_string()),
            },
            None => Some(raw.to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ProfileNameRequired);
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::EndpointsRequired {
                profile: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn has_auth(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn has_tls(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| t.enabled)
    }

    /// Timeout applied to dialing and to each request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// One-line summary, e.g. `prod (etcd1:2379) [auth, tls]`.
    pub fn display_string(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(first) = self.endpoints.first() {
            parts.push(format!("({})", first));
        }

        let mut flags = Vec::new();
        if self.has_auth() {
            flags.push("auth");
        }
        if self.has_tls() {
            flags.push("tls");
        }
        if self.default {
            flags.push("default");
        }
        if !flags.is_empty() {
            parts.push(format!("[{}]", flags.join(", ")));
        }
        parts.join(" ")
    }
}

/// Encode a password for storage.
pub fn encode_password(password: &str) -> String {
    if password.is_empty() {
        return String::new();
    }
    format!("{}{}", PASSWORD_PREFIX, STANDARD.encode(password))
}

/// Contents of `config.yaml`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: Vec<Profile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("profile name is required")]
    ProfileNameRequired,

    #[error("profile '{profile}' needs at least one endpoint")]
    EndpointsRequired { profile: String },

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("no default profile set")]
    NoDefaultProfile,

    #[error("cannot locate home directory")]
    NoHomeDir,
}

impl Config {
    /// Parse configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        for profile in &config.profiles {
            profile.validate()?;
        }
        Ok(config)
    }

    /// Load from `path`. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using empty config");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path`, creating the directory if needed. The file is
    /// readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let mut file = create_private_file(path)?;
        file.write_all(yaml.as_bytes())?;
        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Config with a single `local` profile on the default etcd port.
    pub fn with_local_profile() -> Self {
        let mut local = Profile::new("local", vec!["localhost:2379".to_string()]);
        local.default = true;
        Self {
            profiles: vec![local],
            active_profile: None,
        }
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// Active profile, else the one marked default, else the first.
    pub fn default_profile(&self) -> Result<&Profile, ConfigError> {
        if let Some(p) = self
            .active_profile
            .as_deref()
            .and_then(|name| self.profile(name).ok())
        {
            return Ok(p);
        }
        self.profiles
            .iter()
            .find(|p| p.default)
            .or_else(|| self.profiles.first())
            .ok_or(ConfigError::NoDefaultProfile)
    }

    /// Insert `profile`, replacing one with the same name.
    pub fn add_profile(&mut self, profile: Profile) -> Result<(), ConfigError> {
        profile.validate()?;
        if profile.default {
            for p in &mut self.profiles {
                p.default = false;
            }
        }
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<Profile, ConfigError> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))?;
        if self.active_profile.as_deref() == Some(name) {
            self.active_profile = None;
        }
        Ok(self.profiles.remove(idx))
    }

    pub fn set_active(&mut self, name: &str) -> Result<(), ConfigError> {
        self.profile(name)?;
        self.active_profile = Some(name.to_string());
        Ok(())
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), ConfigError> {
        self.profile(name)?;
        for p in &mut self.profiles {
            p.default = p.name == name;
        }
        Ok(())
    }

    pub fn has_profiles(&self) -> bool {
        !self.profiles.is_empty()
    }
}

/// `$ETCDTUI_CONFIG`, else `config.yaml` under [`config_dir`].
pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// `$XDG_CONFIG_HOME/etcdtui`, else `~/.config/etcdtui`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    resolve_config_dir(std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from), dirs::home_dir())
}

fn resolve_config_dir(xdg: Option<PathBuf>, home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = xdg.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(xdg.join(CONFIG_DIR));
    }
    let home = home.ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join(CONFIG_DIR))
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Open `path` for writing as owner-only before any content lands in it.
/// An existing file is narrowed to 0600 before it is truncated.
#[cfg(unix)]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.set_len(0)?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
active_profile: production
profiles:
  - name: local
    endpoints: ["localhost:2379"]
    default: true
  - name: production
    endpoints: ["etcd1:2379", "etcd2:2379"]
    username: admin
    password: "base64:YWRtaW4xMjM="
    tls:
      enabled: true
      ca_file: /etc/etcd/ca.crt
"#;

    #[test]
    fn test_parse_profiles() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.profiles.len(), 2);

        let prod = config.profile("production").unwrap();
        assert_eq!(prod.endpoints, vec!["etcd1:2379", "etcd2:2379"]);
        assert!(prod.has_auth());
        assert!(prod.has_tls());
        assert_eq!(
            prod.tls.as_ref().and_then(|t| t.ca_file.clone()),
            Some(PathBuf::from("/etc/etcd/ca.crt"))
        );
    }

    #[test]
    fn test_decode_password() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(
            config.profile("production").unwrap().decode_password().as_deref(),
            Some("admin123")
        );

        let mut plain = Profile::new("p", vec!["h:1".into()]);
        plain.password = Some("secret".into());
        assert_eq!(plain.decode_password().as_deref(), Some("secret"));

        plain.password = Some("base64:!!not-base64".into());
        assert_eq!(plain.decode_password().as_deref(), Some("base64:!!not-base64"));

        plain.password = Some(encode_password("hunter2"));
        assert_eq!(plain.decode_password().as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_default_resolution() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.default_profile().unwrap().name, "production");

        config.active_profile = Some("missing".into());
        assert_eq!(config.default_profile().unwrap().name, "local");

        config.profiles[0].default = false;
        config.active_profile = None;
        config.profiles.swap(0, 1);
        assert_eq!(config.default_profile().unwrap().name, "production");

        assert!(matches!(
            Config::default().default_profile(),
            Err(ConfigError::NoDefaultProfile)
        ));
    }

    #[test]
    fn test_validation() {
        let yaml = r#"
profiles:
  - name: empty
    endpoints: []
"#;
        assert!(matches!(
            Config::from_str(yaml),
            Err(ConfigError::EndpointsRequired { .. })
        ));

        let mut config = Config::default();
        let err = config.add_profile(Profile::new("", vec!["h:1".into()]));
        assert!(matches!(err, Err(ConfigError::ProfileNameRequired)));
    }

    #[test]
    fn test_add_set_remove() {
        let mut config = Config::with_local_profile();
        let mut staging = Profile::new("staging", vec!["s:2379".into()]);
        staging.default = true;
        config.add_profile(staging).unwrap();

        assert!(!config.profile("local").unwrap().default);
        assert!(config.profile("staging").unwrap().default);

        config.set_default("local").unwrap();
        assert!(config.profile("local").unwrap().default);
        assert!(!config.profile("staging").unwrap().default);

        config.set_active("staging").unwrap();
        assert!(config.set_active("nope").is_err());
        config.remove_profile("staging").unwrap();
        assert_eq!(config.active_profile, None);
        assert!(matches!(
            config.remove_profile("staging"),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_display_string() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(
            config.profile("local").unwrap().display_string(),
            "local (localhost:2379) [default]"
        );
        assert_eq!(
            config.profile("production").unwrap().display_string(),
            "production (etcd1:2379) [auth, tls]"
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::with_local_profile();
        config.set_active("local").unwrap();
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_save_narrows_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "profiles: []\nextra: padding that must be truncated away\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut config = Config::default();
        let mut prod = Profile::new("prod", vec!["etcd1:2379".to_string()]);
        prod.password = Some(encode_password("secret"));
        config.add_profile(prod).unwrap();
        config.save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_config_dir_resolution() {
        assert_eq!(
            resolve_config_dir(Some("/xdg".into()), Some("/home/u".into())).unwrap(),
            PathBuf::from("/xdg/etcdtui")
        );
        assert_eq!(
            resolve_config_dir(None, Some("/home/u".into())).unwrap(),
            PathBuf::from("/home/u/.config/etcdtui")
        );
        assert!(matches!(
            resolve_config_dir(None, None),
            Err(ConfigError::NoHomeDir)
        ));
    }
}
