//! Layered module settings.
//!
//! Settings for a module are resolved from YAML files in several locations,
//! highest priority first:
//! 1. **Explicit** - paths (or dotted module names) given by the caller
//! 2. **Working directory** - `$CWD/settings.yaml` and friends
//! 3. **User** - the platform config directory, e.g. `~/.config/<module>/`
//! 4. **Legacy** - `~/.<module>/`
//! 5. **Builtin** - the module's bundled `data/` directory
//!
//! ## File names
//! `settings` and `config`, plus `<module>-settings`, `settings-<module>`,
//! `<module>_settings`, `settings_<module>` (and the same for `config`),
//! each with a `.yaml` or `.yml` extension.
//!
//! ## Merge Strategy
//! Top-level keys only: a higher priority file replaces a key's value
//! wholesale. On top of the merged values sits a stack of scoped overrides,
//! see [`Settings::context`].

mod loader;
mod materialize;
mod paths;
mod store;

/// A flat map of setting names to values.
pub type SettingsMap = serde_json::Map<String, serde_json::Value>;

pub use loader::{LoadedLayers, load_layers, read};
pub use materialize::{DirectoryMaterializer, FALLBACK_NAME, PlatformDirs, create_dir, path_value};
pub use paths::{
    Candidate, CandidateSource, ConfigPaths, EXTENSIONS, ModuleLocator, ModuleRoots, NAME_STEMS,
    PathResolver, fname_stems, fnames, is_dotted_module,
};
pub use store::{ContextGuard, Settings, SettingsBuilder};
