use crate::{
    acl::RepoAcl,
    constants::{DEFAULT_BIND, DEFAULT_LOG_LEVEL, ENV_PREFIX},
    credential::Credential,
    models::{Role, User},
    observability::LogFormat,
};
use config::{Config as SettingsLoader, Environment};
use serde::Deserialize;
use std::{
    collections::HashSet,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },
    #[error("duplicate user name '{0}'")]
    DuplicateUser(String),
    #[error("user '{0}' has a blank password")]
    BlankPassword(String),
    #[error("invalid environment: {0}")]
    Environment(String),
}

/// Registry backend plus the static user table. Immutable once loaded;
/// reloads build a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub registry: Option<String>,
    pub users: Vec<Arc<User>>,
}

impl Config {
    /// No users and no backend: every request is refused.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(registry: Option<String>, users: Vec<User>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for user in &users {
            if !seen.insert(user.name.as_str()) {
                return Err(ConfigError::DuplicateUser(user.name.clone()));
            }
        }
        Ok(Self {
            registry: registry
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            users: users.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn find_user(&self, name: &str) -> Option<&Arc<User>> {
        self.users.iter().find(|user| user.name == name)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&path.display().to_string(), &text)
    }

    pub fn from_yaml_str(source_name: &str, text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::empty());
        }
        let parsed =
            serde_yaml::from_str::<YamlConfig>(text).map_err(|err| ConfigError::Parse {
                source_name: source_name.to_string(),
                message: err.to_string(),
            })?;
        Self::from_yaml_config(parsed)
    }

    fn from_yaml_config(parsed: YamlConfig) -> Result<Self, ConfigError> {
        let users = parsed
            .users
            .unwrap_or_default()
            .into_iter()
            .map(parse_user)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed.registry, users)
    }
}

fn parse_user(raw: YamlUser) -> Result<User, ConfigError> {
    let credential = Credential::new(raw.password.unwrap_or_default())
        .map_err(|_| ConfigError::BlankPassword(raw.name.clone()))?;
    let role = match raw.role.as_deref() {
        None => None,
        Some(value) => {
            let role = Role::parse(value);
            if role.is_none() {
                tracing::warn!(
                    user = raw.name.as_str(),
                    role = value,
                    "unrecognized role, user will be denied every request"
                );
            }
            role
        }
    };
    Ok(User {
        name: raw.name,
        credential,
        role,
        repos: raw.repos,
    })
}

#[derive(Debug, Deserialize)]
struct YamlConfig {
    registry: Option<String>,
    users: Option<Vec<YamlUser>>,
}

#[derive(Debug, Deserialize)]
struct YamlUser {
    name: String,
    password: Option<String>,
    role: Option<String>,
    #[serde(default)]
    repos: RepoAcl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    #[default]
    Static,
    OnChange,
}

impl ReloadPolicy {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "on-change" | "on_change" | "onchange" => Self::OnChange,
            _ => Self::Static,
        }
    }
}

/// Process settings taken from `REGISTRY_GUARD_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_path: Option<PathBuf>,
    pub bind: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub reload: ReloadPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: None,
            bind: default_bind(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
            reload: ReloadPolicy::Static,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let loader = SettingsLoader::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(false))
            .build()
            .map_err(|err| ConfigError::Environment(err.to_string()))?;

        let mut settings = Self::default();
        if let Some(path) = env_value(&loader, "config") {
            settings.config_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = env_value(&loader, "bind") {
            settings.bind = raw.parse().map_err(|err| {
                ConfigError::Environment(format!("invalid {ENV_PREFIX}_BIND '{raw}': {err}"))
            })?;
        }
        if let Some(level) = env_value(&loader, "log_level") {
            settings.log_level = level;
        }
        if let Some(format) = env_value(&loader, "log_format") {
            settings.log_format = LogFormat::parse(&format);
        }
        if let Some(policy) = env_value(&loader, "reload") {
            settings.reload = ReloadPolicy::from_str(&policy);
        }
        Ok(settings)
    }
}

fn default_bind() -> SocketAddr {
    DEFAULT_BIND
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)))
}

fn env_value(loader: &SettingsLoader, key: &str) -> Option<String> {
    loader
        .get_string(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
