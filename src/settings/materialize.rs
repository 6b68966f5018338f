//! Directory settings: resolve, create, write back.

use super::SettingsMap;
use crate::error::{Result, SettingsError};
use crate::misc::{first_value, to_list};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name used for platform directories when no module is set.
pub const FALLBACK_NAME: &str = "omnipath";

/// Platform roots that directory defaults are derived from.
#[derive(Debug, Clone, Default)]
pub struct PlatformDirs {
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

impl PlatformDirs {
    /// The current user's platform directories.
    pub fn discover() -> Self {
        Self {
            data_dir: dirs::data_dir(),
            cache_dir: dirs::cache_dir(),
            config_dir: dirs::config_dir(),
        }
    }

    /// All three roots under one directory, as `data`, `cache` and `config`.
    pub fn under(root: &Path) -> Self {
        Self {
            data_dir: Some(root.join("data")),
            cache_dir: Some(root.join("cache")),
            config_dir: Some(root.join("config")),
        }
    }
}

/// Resolves and creates the directory-valued settings of one store.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryMaterializer<'a> {
    pub module: Option<&'a str>,
    pub basedir: Option<&'a Path>,
    pub module_datadir: Option<&'a Path>,
    pub platform: &'a PlatformDirs,
}

impl DirectoryMaterializer<'_> {
    fn name(&self) -> &str {
        self.module.unwrap_or(FALLBACK_NAME)
    }

    fn default_datadir(&self) -> PathBuf {
        self.module_datadir
            .map(Path::to_path_buf)
            .or_else(|| self.platform.data_dir.as_ref().map(|d| d.join(self.name())))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    fn default_cachedir(&self) -> PathBuf {
        self.platform
            .cache_dir
            .as_ref()
            .map(|d| d.join(self.name()))
            .unwrap_or_else(|| PathBuf::from("cache"))
    }

    fn default_secrets_dir(&self) -> PathBuf {
        self.platform
            .config_dir
            .as_ref()
            .map(|d| d.join(self.name()).join("secrets"))
            .unwrap_or_else(|| PathBuf::from("secrets"))
    }

    /// Resolve every directory setting, create it and store the absolute path.
    ///
    /// Safe to run repeatedly: existing directories are left alone and
    /// already rooted relative paths are not joined twice.
    pub fn materialize(&self, settings: &mut SettingsMap) -> Result<()> {
        let datadir = ensure(settings, "datadir", self.default_datadir())?;
        let cachedir = ensure(settings, "cachedir", self.default_cachedir())?;
        ensure(settings, "pickle_dir", cachedir.join("pickles"))?;
        ensure(settings, "secrets_dir", self.default_secrets_dir())?;

        root_under(settings, "in_datadir", &datadir);
        root_under(settings, "in_cachedir", &cachedir);

        settings.insert(
            "module".to_string(),
            self.module.map(Value::from).unwrap_or(Value::Null),
        );
        settings.insert(
            "basedir".to_string(),
            self.basedir.map(path_value).unwrap_or(Value::Null),
        );

        Ok(())
    }
}

/// Convert a path to a settings value.
pub fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

/// Create a directory, tolerating another process creating it first.
pub fn create_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(SettingsError::create_dir(path, e)),
    }
}

fn ensure(settings: &mut SettingsMap, key: &str, default: PathBuf) -> Result<PathBuf> {
    let resolved = first_value([
        settings.get(key).cloned().unwrap_or(Value::Null),
        path_value(&default),
    ])
    .and_then(|v| v.as_str().map(PathBuf::from))
    .unwrap_or(default);

    if !resolved.is_dir() {
        debug!("Creating {} {:?}", key, resolved);
    }
    create_dir(&resolved)?;

    let resolved = std::path::absolute(&resolved).unwrap_or(resolved);
    settings.insert(key.to_string(), path_value(&resolved));
    Ok(resolved)
}

fn root_under(settings: &mut SettingsMap, list_key: &str, dir: &Path) {
    let keys: Vec<String> = settings
        .get(list_key)
        .map(to_list)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();

    for key in keys {
        let Some(current) = settings.get(&key).and_then(Value::as_str).map(PathBuf::from) else {
            continue;
        };
        if !current.starts_with(dir) {
            settings.insert(key, path_value(&dir.join(current)));
        }
    }
}
