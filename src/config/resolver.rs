//! Configuration precedence.
//!
//! Each key resolves independently, highest precedence first:
//! explicit override, environment variable, project file, user file.

use super::{
    api_key_env_var, read_config, read_config_or_default, write_json, ConfigPaths, DefaultKey,
    ProjectConfig, UserConfig,
};
use crate::error::{ImgxError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Values given explicitly by the caller (CLI flags or MCP arguments).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--provider`
    pub provider: Option<String>,
    /// `--model`
    pub model: Option<String>,
    /// `--output-dir`
    pub output_dir: Option<String>,
    /// `--aspect-ratio`
    pub aspect_ratio: Option<String>,
    /// `--resolution`
    pub resolution: Option<String>,
}

impl ConfigOverrides {
    fn get(&self, key: DefaultKey) -> Option<&str> {
        let value = match key {
            DefaultKey::Provider => &self.provider,
            DefaultKey::Model => &self.model,
            DefaultKey::OutputDir => &self.output_dir,
            DefaultKey::AspectRatio => &self.aspect_ratio,
            DefaultKey::Resolution => &self.resolution,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}

/// Settings for one invocation after precedence has been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Provider name.
    pub provider: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Where the model value came from, if resolved.
    pub model_source: Option<ValueSource>,
    /// Directory for generated images.
    pub output_dir: Option<PathBuf>,
    /// Aspect ratio token.
    pub aspect_ratio: Option<String>,
    /// Resolution label.
    pub resolution: Option<String>,
    /// API key of the resolved provider.
    pub api_key: Option<String>,
}

/// The layer a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// CLI flag or MCP argument.
    Override,
    /// Environment variable.
    Env,
    /// Project file.
    Project,
    /// User config file.
    User,
}

/// Resolves settings from overrides, environment and config files.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    paths: ConfigPaths,
    env: HashMap<String, String>,
}

impl ConfigResolver {
    /// Creates a resolver over explicit paths and an environment snapshot.
    pub fn new(paths: ConfigPaths, env: HashMap<String, String>) -> Self {
        Self { paths, env }
    }

    /// Creates a resolver for the current process environment and working directory.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ConfigPaths::from_env()?, std::env::vars().collect()))
    }

    /// Returns the config file locations.
    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    fn env_value(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Reads the user config, or an empty one if it is missing or malformed.
    pub fn user_config(&self) -> UserConfig {
        read_config_or_default(&self.paths.user_file())
    }

    /// Reads the project file, or an empty one if it is missing or malformed.
    pub fn project_config(&self) -> ProjectConfig {
        let project: ProjectConfig = read_config_or_default(&self.paths.project_file);
        if project.has_credentials() {
            tracing::warn!(
                path = %self.paths.project_file.display(),
                "ignoring \"providers\" block in project file; API keys belong in the user config"
            );
        }
        project
    }

    /// Resolves one default setting without overrides.
    pub fn resolve(&self, key: DefaultKey) -> Option<String> {
        let project = self.project_config();
        let user = self.user_config();
        self.resolve_from(key, None, &project, &user)
            .map(|(value, _)| value)
    }

    fn resolve_from(
        &self,
        key: DefaultKey,
        overrides: Option<&ConfigOverrides>,
        project: &ProjectConfig,
        user: &UserConfig,
    ) -> Option<(String, ValueSource)> {
        if let Some(value) = overrides.and_then(|o| o.get(key)) {
            return Some((value.to_string(), ValueSource::Override));
        }
        if let Some(value) = key.env_var().and_then(|var| self.env_value(var)) {
            return Some((value.to_string(), ValueSource::Env));
        }
        if let Some(value) = project.defaults.get(key) {
            return Some((value.to_string(), ValueSource::Project));
        }
        user.defaults
            .get(key)
            .map(|value| (value.to_string(), ValueSource::User))
    }

    /// Resolves the API key for `provider`: environment variable, then user config.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(key) = api_key_env_var(provider).and_then(|var| self.env_value(var)) {
            return Some(key.to_string());
        }
        self.user_config().api_key(provider).map(str::to_string)
    }

    /// Resolves every setting, letting `overrides` win where present.
    pub fn resolve_with(&self, overrides: &ConfigOverrides) -> ResolvedConfig {
        let project = self.project_config();
        let user = self.user_config();
        let get = |key| self.resolve_from(key, Some(overrides), &project, &user);

        let provider = get(DefaultKey::Provider).map(|(v, _)| v);
        let (model, model_source) = match get(DefaultKey::Model) {
            Some((value, source)) => (Some(value), Some(source)),
            None => (None, None),
        };
        let api_key = provider.as_deref().and_then(|p| {
            api_key_env_var(p)
                .and_then(|var| self.env_value(var))
                .or_else(|| user.api_key(p))
                .map(str::to_string)
        });

        ResolvedConfig {
            provider,
            model,
            model_source,
            output_dir: get(DefaultKey::OutputDir).map(|(v, _)| PathBuf::from(v)),
            aspect_ratio: get(DefaultKey::AspectRatio).map(|(v, _)| v),
            resolution: get(DefaultKey::Resolution).map(|(v, _)| v),
            api_key,
        }
    }

    /// Rewrites the user config file with owner-only permissions.
    pub fn save(&self, config: &UserConfig) -> Result<()> {
        let path = self.paths.user_file();
        write_json(&path, config, true)?;
        tracing::debug!(path = %path.display(), "saved user config");
        Ok(())
    }

    /// Reads the user config for an update. Unlike [`user_config`](Self::user_config),
    /// a malformed file is an error so that rewriting it cannot drop its contents.
    fn user_config_for_update(&self) -> Result<UserConfig> {
        let path = self.paths.user_file();
        match read_config(&path) {
            Ok(config) => Ok(config.unwrap_or_default()),
            Err(ImgxError::Json(e)) => Err(ImgxError::InvalidRequest(format!(
                "config file is malformed: {}: {e}. Fix or remove it before changing settings.",
                path.display()
            ))),
            Err(e) => Err(e),
        }
    }

    /// Stores an API key for `provider` in the user config.
    pub fn set_api_key(&self, provider: &str, api_key: &str) -> Result<()> {
        let mut config = self.user_config_for_update()?;
        config
            .providers
            .entry(provider.to_string())
            .or_default()
            .api_key = Some(api_key.to_string());
        self.save(&config)
    }

    /// Stores a default setting in the user config.
    pub fn set_default(&self, key: DefaultKey, value: &str) -> Result<()> {
        let mut config = self.user_config_for_update()?;
        config.defaults.set(key, value);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn resolver(root: &Path, env: &[(&str, &str)]) -> ConfigResolver {
        let env = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigResolver::new(ConfigPaths::in_dir(root), env)
    }

    fn write_project(root: &Path, json: &str) {
        std::fs::write(root.join(".imgxrc"), json).unwrap();
    }

    #[test]
    fn test_precedence_env_project_user() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let with_env = resolver(root, &[("IMGX_MODEL", "from-env")]);
        with_env.set_default(DefaultKey::Model, "from-user").unwrap();
        write_project(root, r#"{ "defaults": { "model": "from-project" } }"#);

        assert_eq!(with_env.resolve(DefaultKey::Model).as_deref(), Some("from-env"));

        let without_env = resolver(root, &[]);
        assert_eq!(
            without_env.resolve(DefaultKey::Model).as_deref(),
            Some("from-project")
        );

        std::fs::remove_file(root.join(".imgxrc")).unwrap();
        assert_eq!(
            without_env.resolve(DefaultKey::Model).as_deref(),
            Some("from-user")
        );

        std::fs::remove_file(without_env.paths().user_file()).unwrap();
        assert_eq!(without_env.resolve(DefaultKey::Model), None);
    }

    #[test]
    fn test_override_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("IMGX_PROVIDER", "openai")]);
        write_project(dir.path(), r#"{ "defaults": { "provider": "gemini" } }"#);

        let overrides = ConfigOverrides {
            provider: Some("custom".into()),
            ..Default::default()
        };
        assert_eq!(r.resolve_with(&overrides).provider.as_deref(), Some("custom"));
        assert_eq!(
            r.resolve_with(&ConfigOverrides::default()).provider.as_deref(),
            Some("openai")
        );
    }

    #[test]
    fn test_precedence_is_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("IMGX_OUTPUT_DIR", "/env/out")]);
        write_project(dir.path(), r#"{ "defaults": { "aspectRatio": "16:9" } }"#);
        r.set_default(DefaultKey::Resolution, "2K").unwrap();
        r.set_default(DefaultKey::AspectRatio, "1:1").unwrap();

        let resolved = r.resolve_with(&ConfigOverrides::default());
        assert_eq!(resolved.output_dir, Some(PathBuf::from("/env/out")));
        assert_eq!(resolved.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(resolved.resolution.as_deref(), Some("2K"));
        assert_eq!(resolved.provider, None);
        assert_eq!(resolved.model, None);
        assert_eq!(resolved.model_source, None);
    }

    #[test]
    fn test_aspect_ratio_has_no_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("IMGX_ASPECT_RATIO", "16:9")]);
        assert_eq!(r.resolve(DefaultKey::AspectRatio), None);
    }

    #[test]
    fn test_empty_env_value_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("IMGX_PROVIDER", "")]);
        r.set_default(DefaultKey::Provider, "openai").unwrap();
        assert_eq!(r.resolve(DefaultKey::Provider).as_deref(), Some("openai"));
    }

    #[test]
    fn test_model_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);
        r.set_default(DefaultKey::Model, "m").unwrap();
        assert_eq!(
            r.resolve_with(&ConfigOverrides::default()).model_source,
            Some(ValueSource::User)
        );
    }

    #[test]
    fn test_malformed_files_resolve_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);
        write_project(dir.path(), "not json at all");
        std::fs::create_dir_all(&r.paths().config_dir).unwrap();
        std::fs::write(r.paths().user_file(), "{ broken").unwrap();

        assert_eq!(r.resolve(DefaultKey::Provider), None);
        assert_eq!(r.resolve_api_key("gemini"), None);
    }

    #[test]
    fn test_api_key_env_before_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("GEMINI_API_KEY", "env-key")]);
        r.set_api_key("gemini", "file-key").unwrap();
        r.set_api_key("openai", "sk-file").unwrap();

        assert_eq!(r.resolve_api_key("gemini").as_deref(), Some("env-key"));
        assert_eq!(r.resolve_api_key("openai").as_deref(), Some("sk-file"));
        assert_eq!(r.resolve_api_key("unknown"), None);
    }

    #[test]
    fn test_project_file_credentials_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);
        write_project(
            dir.path(),
            r#"{ "providers": { "gemini": { "apiKey": "leaked" } }, "defaults": { "model": "m" } }"#,
        );

        assert_eq!(r.resolve_api_key("gemini"), None);
        assert_eq!(r.resolve(DefaultKey::Model).as_deref(), Some("m"));
    }

    #[test]
    fn test_resolve_with_includes_provider_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[("OPENAI_API_KEY", "sk-env")]);
        let overrides = ConfigOverrides {
            provider: Some("openai".into()),
            ..Default::default()
        };
        assert_eq!(r.resolve_with(&overrides).api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn test_writes_merge_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);
        std::fs::create_dir_all(&r.paths().config_dir).unwrap();
        std::fs::write(
            r.paths().user_file(),
            r#"{ "defaults": { "model": "keep-me" }, "custom": 1 }"#,
        )
        .unwrap();

        r.set_api_key("gemini", "g-key").unwrap();
        r.set_default(DefaultKey::OutputDir, "./images").unwrap();

        let config = r.user_config();
        assert_eq!(config.api_key("gemini"), Some("g-key"));
        assert_eq!(config.defaults.get(DefaultKey::Model), Some("keep-me"));
        assert_eq!(config.defaults.get(DefaultKey::OutputDir), Some("./images"));
        assert_eq!(config.extra["custom"], 1);
    }

    #[test]
    fn test_writes_refuse_malformed_user_config() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);
        std::fs::create_dir_all(&r.paths().config_dir).unwrap();
        let original =
            r#"{"providers":{"gemini":{"apiKey":"AIza-keep-this"}},"defaults":{"model":5}}"#;
        std::fs::write(r.paths().user_file(), original).unwrap();

        let err = r.set_default(DefaultKey::OutputDir, "./out").unwrap_err();
        assert!(matches!(err, ImgxError::InvalidRequest(ref m) if m.contains("malformed")));
        assert!(r.set_api_key("openai", "sk-new").is_err());

        let on_disk = std::fs::read_to_string(r.paths().user_file()).unwrap();
        assert_eq!(on_disk, original);
    }

    #[test]
    fn test_writes_create_missing_user_config() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), &[]);

        r.set_default(DefaultKey::Resolution, "2K").unwrap();
        assert_eq!(r.resolve(DefaultKey::Resolution).as_deref(), Some("2K"));
    }
}
