//! Layer loading.
//!
//! Candidates are applied lowest priority first, so a higher priority file
//! read later overwrites the keys it shares with lower priority ones.
//! Merging stops at the top level: a later layer replaces a key's value
//! wholesale, nested or not.

use super::SettingsMap;
use crate::error::{Result, SettingsError};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of folding all layers together.
#[derive(Debug, Clone, Default)]
pub struct LoadedLayers {
    /// Merged top-level settings
    pub settings: SettingsMap,
    /// Files actually read, in the order read
    pub parsed: Vec<PathBuf>,
}

/// Read one YAML config file into a flat map.
///
/// A missing or unreadable file yields an empty map. An empty document is
/// an empty map. Malformed YAML, text that is not UTF-8 and non-mapping
/// documents are errors.
pub fn read(path: &Path) -> Result<SettingsMap> {
    Ok(read_layer(path)?.unwrap_or_default())
}

/// Like [`read`], but `None` when the file could not be read at all.
fn read_layer(path: &Path) -> Result<Option<SettingsMap>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::InvalidData => {
            return Err(SettingsError::encoding(path, err));
        }
        Err(err) => {
            debug!("Skipping unreadable config file {:?}: {}", path, err);
            return Ok(None);
        }
    };

    let value: Value =
        serde_yaml::from_str(&content).map_err(|e| SettingsError::parse(path, e))?;

    match value {
        Value::Null => Ok(Some(SettingsMap::new())),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(SettingsError::not_a_mapping(path)),
    }
}

/// Apply every existing candidate, lowest priority (last) first.
///
/// A path listed more than once is read only the first time it is met in
/// this reversed walk. Files that exist but cannot be read are skipped and
/// left out of [`LoadedLayers::parsed`].
pub fn load_layers<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedLayers> {
    let mut loaded = LoadedLayers::default();

    for path in candidates.iter().rev() {
        let path: &Path = path.as_ref();
        if !path.exists() || loaded.parsed.iter().any(|p| p == path) {
            continue;
        }

        let Some(layer) = read_layer(path)? else {
            continue;
        };
        debug!("Read {} settings from {:?}", layer.len(), path);
        loaded.parsed.push(path.to_path_buf());
        loaded.settings.extend(layer);
    }

    Ok(loaded)
}
