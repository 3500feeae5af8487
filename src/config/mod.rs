//! Configuration files and paths.
//!
//! Two JSON files feed the resolver:
//!
//! - the user config (`<config dir>/config.json`), which holds defaults and
//!   per-provider API keys and is the only file imgx writes;
//! - the project file (`.imgxrc` in the working directory), which holds
//!   defaults only and is expected to be committed to version control.
//!
//! The user config directory is, in order: `$IMGX_CONFIG_DIR`; the platform
//! roaming config dir on Windows; `$XDG_CONFIG_HOME/imgx`; `~/.config/imgx`.

mod last_output;
mod resolver;

pub use last_output::{LastOutputRecord, LastOutputStore};
pub use resolver::{ConfigOverrides, ConfigResolver, ResolvedConfig, ValueSource};

use crate::error::{ImgxError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the user config directory.
pub const CONFIG_DIR_ENV: &str = "IMGX_CONFIG_DIR";

/// File name of the project-level config.
pub const PROJECT_FILE_NAME: &str = ".imgxrc";

const USER_FILE_NAME: &str = "config.json";
const LAST_OUTPUT_FILE_NAME: &str = "last-output.json";

/// Where the config files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Directory holding `config.json` and `last-output.json`.
    pub config_dir: PathBuf,
    /// Path of the project file (normally `./.imgxrc`).
    pub project_file: PathBuf,
}

impl ConfigPaths {
    /// Resolves the standard locations for the current user and working directory.
    pub fn from_env() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => default_config_dir()?,
        };
        let project_file = std::env::current_dir()?.join(PROJECT_FILE_NAME);
        Ok(Self {
            config_dir,
            project_file,
        })
    }

    /// Places both the user config directory and the project file under `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.join("config"),
            project_file: root.join(PROJECT_FILE_NAME),
        }
    }

    /// Path of the user config file.
    pub fn user_file(&self) -> PathBuf {
        self.config_dir.join(USER_FILE_NAME)
    }

    /// Path of the last-output record.
    pub fn last_output_file(&self) -> PathBuf {
        self.config_dir.join(LAST_OUTPUT_FILE_NAME)
    }
}

#[cfg(windows)]
fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("imgx"))
        .ok_or_else(|| ImgxError::InvalidRequest("could not determine config directory".into()))
}

#[cfg(not(windows))]
fn default_config_dir() -> Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("imgx"));
    }
    dirs::home_dir()
        .map(|home| home.join(".config").join("imgx"))
        .ok_or_else(|| ImgxError::InvalidRequest("could not determine home directory".into()))
}

/// Default settings shared by the user and project files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    /// Provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Directory for generated images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Aspect ratio token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Resolution label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Defaults {
    /// Returns the value stored for `key`, ignoring empty strings.
    pub fn get(&self, key: DefaultKey) -> Option<&str> {
        let value = match key {
            DefaultKey::Provider => &self.provider,
            DefaultKey::Model => &self.model,
            DefaultKey::OutputDir => &self.output_dir,
            DefaultKey::AspectRatio => &self.aspect_ratio,
            DefaultKey::Resolution => &self.resolution,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Stores `value` for `key`.
    pub fn set(&mut self, key: DefaultKey, value: impl Into<String>) {
        let slot = match key {
            DefaultKey::Provider => &mut self.provider,
            DefaultKey::Model => &mut self.model,
            DefaultKey::OutputDir => &mut self.output_dir,
            DefaultKey::AspectRatio => &mut self.aspect_ratio,
            DefaultKey::Resolution => &mut self.resolution,
        };
        *slot = Some(value.into());
    }
}

/// Credentials stored for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// API key for the provider.
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Contents of the user config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Credentials keyed by provider name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderCredentials>,
    /// Default settings.
    #[serde(default)]
    pub defaults: Defaults,
    /// Keys imgx does not know about, kept so rewrites do not drop them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserConfig {
    /// Returns the stored API key for `provider`, ignoring empty strings.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }
}

/// Contents of the project file. Only `defaults` is honored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectConfig {
    /// Default settings.
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    providers: Option<Value>,
}

impl ProjectConfig {
    /// Returns true if the file carried a `providers` block, which is ignored.
    pub fn has_credentials(&self) -> bool {
        self.providers.is_some()
    }
}

/// Default settings that can be resolved from several sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultKey {
    /// `provider`
    Provider,
    /// `model`
    Model,
    /// `outputDir`
    OutputDir,
    /// `aspectRatio`
    AspectRatio,
    /// `resolution`
    Resolution,
}

impl DefaultKey {
    /// All keys, in display order.
    pub const ALL: [DefaultKey; 5] = [
        Self::Provider,
        Self::Model,
        Self::OutputDir,
        Self::AspectRatio,
        Self::Resolution,
    ];

    /// Environment variable consulted for this key, if any.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::Provider => Some("IMGX_PROVIDER"),
            Self::Model => Some("IMGX_MODEL"),
            Self::OutputDir => Some("IMGX_OUTPUT_DIR"),
            Self::AspectRatio | Self::Resolution => None,
        }
    }

    /// CLI spelling of the key (e.g., "output-dir").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Model => "model",
            Self::OutputDir => "output-dir",
            Self::AspectRatio => "aspect-ratio",
            Self::Resolution => "resolution",
        }
    }
}

impl std::fmt::Display for DefaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key accepted by `imgx config get/set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Per-provider API key.
    ApiKey,
    /// One of the default settings.
    Default(DefaultKey),
}

impl ConfigKey {
    /// Spellings accepted on the command line.
    pub const VALID_KEYS: &'static str =
        "api-key, provider, model, output-dir, aspect-ratio, resolution";
}

impl std::str::FromStr for ConfigKey {
    type Err = ImgxError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "api-key" {
            return Ok(Self::ApiKey);
        }
        DefaultKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .map(Self::Default)
            .ok_or_else(|| {
                ImgxError::InvalidRequest(format!(
                    "Unknown key: {s}. Valid keys: {}",
                    Self::VALID_KEYS
                ))
            })
    }
}

/// Environment variable holding the API key of a built-in provider.
pub fn api_key_env_var(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

/// Masks an API key for display: first 6 and last 4 characters, middle redacted.
///
/// Keys too short to keep a hidden middle are fully redacted.
pub fn mask_api_key(key: &str) -> String {
    const PREFIX: usize = 6;
    const SUFFIX: usize = 4;

    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= PREFIX + SUFFIX {
        return "***".to_string();
    }
    let prefix: String = chars[..PREFIX].iter().collect();
    let suffix: String = chars[chars.len() - SUFFIX..].iter().collect();
    format!("{prefix}...{suffix}")
}

/// Reads a JSON config file, treating any failure as an empty config.
///
/// A missing file is silent; unreadable or malformed files are logged.
pub(crate) fn read_config_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_config(path) {
        Ok(Some(config)) => config,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable config file: {e}");
            T::default()
        }
    }
}

/// Reads a JSON config file. A missing file is `Ok(None)`.
pub(crate) fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Writes `value` as pretty JSON, creating parent directories.
///
/// With `private` set, the file is owner-only on Unix from the moment it is
/// created, and an existing file is narrowed before it is rewritten.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T, private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');

    let mut file = open_for_write(path, private)?;
    if private {
        restrict_to_owner(&file, path);
    }
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(unix)]
fn open_for_write(path: &Path, private: bool) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _private: bool) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn restrict_to_owner(file: &File, path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = file.set_permissions(std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), "failed to restrict config permissions: {e}");
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_file: &File, _path: &Path) {}
