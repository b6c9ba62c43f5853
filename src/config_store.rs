//! Publication of configuration snapshots.
//!
//! Each request takes one `Arc<Config>` and uses it throughout, so a reload that
//! lands mid-request is never observed half-applied. Reloads parse the whole
//! file first and swap the pointer only on success.

use crate::config::{Config, ConfigError, ReloadPolicy};
use arc_swap::ArcSwap;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Loaded {
    config: Arc<Config>,
    modified: Option<SystemTime>,
}

#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    policy: ReloadPolicy,
    current: ArcSwap<Loaded>,
}

impl ConfigStore {
    /// A store that serves `config` forever and has no file behind it.
    pub fn fixed(config: Config) -> Self {
        Self {
            path: None,
            policy: ReloadPolicy::Static,
            current: ArcSwap::from_pointee(Loaded {
                config: Arc::new(config),
                modified: None,
            }),
        }
    }

    /// Loads the initial snapshot. A missing path, or a file that cannot be
    /// read, falls back to the empty configuration; a file that reads but does
    /// not parse or validate is an error.
    pub fn open(path: Option<PathBuf>, policy: ReloadPolicy) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            warn!("no configuration file configured, every request will be refused");
            return Ok(Self {
                path: None,
                policy,
                current: ArcSwap::from_pointee(Loaded {
                    config: Arc::new(Config::empty()),
                    modified: None,
                }),
            });
        };

        let loaded = match Config::from_yaml_file(&path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    registry = config.registry.as_deref().unwrap_or("<none>"),
                    users = config.users.len(),
                    "loaded configuration"
                );
                debug!(config = ?config, "configuration snapshot");
                Loaded {
                    config: Arc::new(config),
                    modified: modified_time(&path),
                }
            }
            Err(ConfigError::Read { source, .. }) => {
                warn!(
                    path = %path.display(),
                    error = %source,
                    "configuration file not readable, using empty configuration"
                );
                Loaded {
                    config: Arc::new(Config::empty()),
                    modified: None,
                }
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            path: Some(path),
            policy,
            current: ArcSwap::from_pointee(loaded),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// The published snapshot, without consulting the file.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.load().config.clone()
    }

    /// The snapshot to use for a new request. Under [`ReloadPolicy::OnChange`]
    /// a changed modification time triggers a reload first. A failed reload
    /// keeps serving the previous snapshot and records the failed file's
    /// modification time, so the same broken file is not parsed again.
    pub async fn current(&self) -> Arc<Config> {
        if self.policy == ReloadPolicy::OnChange
            && let Some(path) = self.path.as_deref()
        {
            let on_disk = tokio::fs::metadata(path)
                .await
                .ok()
                .and_then(|meta| meta.modified().ok());
            let published = self.current.load().modified;
            if on_disk.is_some() && on_disk != published {
                if let Err(err) = self.reload().await {
                    warn!(error = %err, "configuration reload failed, keeping previous snapshot");
                    let previous = self.current.load_full();
                    self.current.store(Arc::new(Loaded {
                        config: previous.config.clone(),
                        modified: on_disk,
                    }));
                }
            }
        }
        self.snapshot()
    }

    /// Re-reads the file and publishes the result atomically.
    pub async fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(self.snapshot());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let modified = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok());
        let config = Arc::new(Config::from_yaml_str(&path.display().to_string(), &text)?);
        self.current.store(Arc::new(Loaded {
            config: config.clone(),
            modified,
        }));
        info!(
            path = %path.display(),
            users = config.users.len(),
            "configuration reloaded"
        );
        Ok(config)
    }

    /// Publishes `config` in place of the current snapshot.
    pub fn replace(&self, config: Config) {
        self.current.store(Arc::new(Loaded {
            config: Arc::new(config),
            modified: None,
        }));
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|meta| meta.modified().ok())
}
