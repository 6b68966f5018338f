//! The settings store: merged layers, defaults and scoped overrides.

use super::SettingsMap;
use super::loader::{self, LoadedLayers, load_layers};
use super::materialize::{DirectoryMaterializer, PlatformDirs};
use super::paths::{Candidate, ConfigPaths, ModuleLocator, ModuleRoots, PathResolver};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// One active scoped override.
#[derive(Debug)]
struct ContextFrame {
    id: u64,
    values: SettingsMap,
}

#[derive(Debug, Default)]
struct State {
    /// Merged layers plus everything passed to `setup`
    settings: SettingsMap,
    /// Active overrides, outermost first
    contexts: Vec<ContextFrame>,
    /// `settings` as it was right after layering and materialization
    defaults: SettingsMap,
    parsed: Vec<PathBuf>,
}

impl State {
    /// Innermost context holding the key, else the base map.
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.contexts
            .iter()
            .rev()
            .find_map(|ctx| ctx.values.get(name))
            .or_else(|| self.settings.get(name))
    }
}

fn to_map<I, K, V>(values: I) -> SettingsMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Settings of one module.
///
/// All operations take `&self`; the mutable state sits behind a mutex so a
/// store can be shared between threads as `Arc<Settings>`.
///
/// # Example
/// ```no_run
/// use omnipath_common::settings::Settings;
///
/// let settings = Settings::builder().module("pypath").build()?;
/// settings.set("timeout", 30);
/// {
///     let _ctx = settings.context([("timeout", 5)]);
///     assert_eq!(settings.get_i64("timeout"), Some(5));
/// }
/// assert_eq!(settings.get_i64("timeout"), Some(30));
/// # Ok::<(), omnipath_common::SettingsError>(())
/// ```
#[derive(Debug)]
pub struct Settings {
    author: Option<String>,
    explicit: Vec<PathBuf>,
    resolver: PathResolver,
    platform: PlatformDirs,
    builtin: SettingsMap,
    state: Mutex<State>,
    next_context: AtomicU64,
}

/// Builder for [`Settings`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    module: Option<String>,
    author: Option<String>,
    paths: Vec<PathBuf>,
    locator: Option<Arc<dyn ModuleLocator>>,
    config_paths: Option<ConfigPaths>,
    platform_dirs: Option<PlatformDirs>,
    values: SettingsMap,
}

impl SettingsBuilder {
    /// Name of the module the settings belong to.
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Add an explicit config file or dotted module name.
    ///
    /// Explicit entries take priority over every discovered location, the
    /// first one added being the highest.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Where modules live on disk. Defaults to an empty table.
    pub fn locator(mut self, locator: Arc<dyn ModuleLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Override the discovered search directories.
    pub fn config_paths(mut self, paths: ConfigPaths) -> Self {
        self.config_paths = Some(paths);
        self
    }

    /// Override the platform roots used for directory defaults.
    pub fn platform_dirs(mut self, dirs: PlatformDirs) -> Self {
        self.platform_dirs = Some(dirs);
        self
    }

    /// A value applied after construction, so it is not part of the defaults.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Settings> {
        let locator = self
            .locator
            .unwrap_or_else(|| Arc::new(ModuleRoots::default()));
        let dirs = self.config_paths.unwrap_or_else(|| {
            ConfigPaths::discover(self.module.as_deref(), self.author.as_deref())
        });
        let resolver = PathResolver::new(self.module, dirs, locator);
        let builtin = read_builtin(&resolver)?;

        let settings = Settings {
            author: self.author,
            explicit: self.paths,
            resolver,
            platform: self.platform_dirs.unwrap_or_else(PlatformDirs::discover),
            builtin,
            state: Mutex::new(State::default()),
            next_context: AtomicU64::new(0),
        };
        settings.reset_all()?;
        settings.setup(self.values);

        Ok(settings)
    }
}

/// The first config file present in the module's data directory.
fn read_builtin(resolver: &PathResolver) -> Result<SettingsMap> {
    let Some(datadir) = resolver.module_datadir() else {
        return Ok(SettingsMap::new());
    };

    match resolver
        .fnames()
        .into_iter()
        .map(|f| datadir.join(f))
        .find(|p| p.is_file())
    {
        Some(path) => loader::read(&path),
        None => Ok(SettingsMap::new()),
    }
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Read one YAML config file.
    pub fn read(path: &Path) -> Result<SettingsMap> {
        loader::read(path)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn module(&self) -> Option<&str> {
        self.resolver.module()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Every candidate config path with its origin, highest priority first.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.resolver.resolve(&self.explicit)
    }

    /// Every candidate config path, highest priority first.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.candidates().into_iter().map(|c| c.path).collect()
    }

    /// Candidates from the selected location classes only.
    pub fn paths_in(&self, wd: bool, user: bool, legacy: bool, builtin: bool) -> Vec<PathBuf> {
        self.resolver
            .paths_in(wd, user, legacy, builtin)
            .into_iter()
            .map(|c| c.path)
            .collect()
    }

    /// Config files read by the last full load, in the order read.
    pub fn parsed_files(&self) -> Vec<PathBuf> {
        self.lock().parsed.clone()
    }

    fn materialize(&self, settings: &mut SettingsMap) -> Result<()> {
        let basedir = self.resolver.module_basedir();
        let module_datadir = self.resolver.module_datadir();

        DirectoryMaterializer {
            module: self.module(),
            basedir: basedir.as_deref(),
            module_datadir: module_datadir.as_deref(),
            platform: &self.platform,
        }
        .materialize(settings)
    }

    /// Resolve and create the directory settings again.
    ///
    /// Runs on the live values, so directories set since construction are
    /// created too. The defaults snapshot is not touched.
    pub fn materialize_dirs(&self) -> Result<()> {
        let mut state = self.lock();
        self.materialize(&mut state.settings)
    }

    /// Discard every change and context, then load all layers again.
    pub fn reset_all(&self) -> Result<()> {
        let LoadedLayers {
            mut settings,
            parsed,
        } = load_layers(&self.candidate_paths())?;
        self.materialize(&mut settings)?;

        info!(
            "Loaded settings for {} from {} file(s)",
            self.module().unwrap_or("<none>"),
            parsed.len()
        );

        let mut state = self.lock();
        state.defaults = settings.clone();
        state.settings = settings;
        state.contexts.clear();
        state.parsed = parsed;
        Ok(())
    }

    /// Merge values into the settings, overwriting existing keys.
    pub fn setup<I, K, V>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.lock().settings.extend(to_map(values));
    }

    /// Set a single value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.lock().settings.insert(name.into(), value.into());
    }

    /// Current value of a setting.
    ///
    /// The innermost context holding the name wins, then the base settings.
    /// Unknown names and `null` values give `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().lookup(name).filter(|v| !v.is_null()).cloned()
    }

    /// Current value, or `default` if unset.
    pub fn get_or(&self, name: &str, default: impl Into<Value>) -> Value {
        self.get(name).unwrap_or_else(|| default.into())
    }

    /// Resolve a parameter that a caller may already have been given.
    ///
    /// A non-null `override_value` is returned as is without looking at the
    /// store; otherwise the current value, otherwise `default`.
    pub fn resolve(
        &self,
        name: &str,
        override_value: Option<Value>,
        default: Option<Value>,
    ) -> Option<Value> {
        override_value
            .filter(|v| !v.is_null())
            .or_else(|| self.get(name))
            .or(default)
    }

    /// Current value deserialized into `T`; `None` if unset or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }

    pub fn get_path(&self, name: &str) -> Option<PathBuf> {
        self.get_str(name).map(PathBuf::from)
    }

    /// Value of a setting right after construction.
    pub fn default(&self, name: &str) -> Option<Value> {
        self.lock()
            .defaults
            .get(name)
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Value from the module's bundled config file, ignoring user config.
    pub fn builtin_default(&self, name: &str) -> Option<Value> {
        self.builtin.get(name).filter(|v| !v.is_null()).cloned()
    }

    /// Put a setting back to its value right after construction.
    ///
    /// A name that had no value then is removed.
    pub fn reset(&self, name: &str) {
        let mut state = self.lock();
        match state.defaults.get(name).cloned() {
            Some(value) => {
                state.settings.insert(name.to_string(), value);
            }
            None => {
                state.settings.remove(name);
            }
        }
    }

    /// Override values until the returned guard is dropped.
    ///
    /// Contexts nest: the most recent one wins over outer ones and over the
    /// base settings. The override is removed however the scope is left,
    /// including by `?` or a panic. Each guard removes exactly the frame it
    /// pushed.
    pub fn context<I, K, V>(&self, values: I) -> ContextGuard<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let id = self.next_context.fetch_add(1, Ordering::Relaxed);
        let values = to_map(values);
        debug!("Entering settings context with {} override(s)", values.len());
        self.lock().contexts.push(ContextFrame { id, values });

        ContextGuard { settings: self, id }
    }

    /// Run `f` with values overridden.
    pub fn scoped<I, K, V, R>(&self, values: I, f: impl FnOnce() -> R) -> R
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let _guard = self.context(values);
        f()
    }

    fn pop_context(&self, id: u64) {
        let mut state = self.lock();
        if let Some(pos) = state.contexts.iter().rposition(|c| c.id == id) {
            state.contexts.remove(pos);
        }
    }

    /// Number of active contexts.
    pub fn context_depth(&self) -> usize {
        self.lock().contexts.len()
    }

    /// Active contexts, innermost first.
    pub fn contexts(&self) -> Vec<SettingsMap> {
        self.lock()
            .contexts
            .iter()
            .rev()
            .map(|c| c.values.clone())
            .collect()
    }

    /// Whether a name is set in any active context or in the base settings.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().lookup(name).is_some()
    }

    /// All names visible through contexts or the base settings, sorted.
    pub fn keys(&self) -> Vec<String> {
        let state = self.lock();
        state
            .contexts
            .iter()
            .flat_map(|c| c.values.keys())
            .chain(state.settings.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Copy of the base settings, without contexts.
    pub fn as_map(&self) -> SettingsMap {
        self.lock().settings.clone()
    }
}

/// Keeps a scoped override active; removes it on drop.
#[derive(Debug)]
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct ContextGuard<'a> {
    settings: &'a Settings,
    id: u64,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.settings.pop_context(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> Settings {
        Settings::builder()
            .module("pkg")
            .config_paths(ConfigPaths::with_dirs(
                Some(temp.path().join("wd")),
                None,
                None,
            ))
            .platform_dirs(PlatformDirs::under(temp.path()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_name_is_none() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        assert_eq!(s.get("nope"), None);
        assert_eq!(s.get_or("nope", 7), json!(7));
        assert!(!s.contains("nope"));
    }

    #[test]
    fn test_null_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", Value::Null);
        assert!(s.contains("x"));
        assert_eq!(s.get_or("x", "fallback"), json!("fallback"));
    }

    #[test]
    fn test_resolve_override_bypasses_store() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", 1);
        assert_eq!(s.resolve("x", Some(json!(9)), None), Some(json!(9)));
        assert_eq!(s.resolve("x", None, Some(json!(5))), Some(json!(1)));
        assert_eq!(s.resolve("y", Some(Value::Null), Some(json!(5))), Some(json!(5)));
    }

    #[test]
    fn test_context_shadows_and_restores() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.setup([("x", 1)]);
        {
            let _ctx = s.context([("x", 2)]);
            assert_eq!(s.get_i64("x"), Some(2));
            assert_eq!(s.context_depth(), 1);
        }
        assert_eq!(s.get_i64("x"), Some(1));
        assert_eq!(s.context_depth(), 0);
    }

    #[test]
    fn test_nested_contexts_lifo() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", 1);
        {
            let _a = s.context([("x", 2)]);
            {
                let _b = s.context([("x", 3), ("y", 4)]);
                assert_eq!(s.get_i64("x"), Some(3));
                assert_eq!(s.contexts()[0]["y"], json!(4));
            }
            assert_eq!(s.get_i64("x"), Some(2));
            assert_eq!(s.get("y"), None);
        }
        assert_eq!(s.get_i64("x"), Some(1));
    }

    #[test]
    fn test_outer_context_visible_when_inner_lacks_key() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        let _a = s.context([("x", 2)]);
        let _b = s.context([("y", 3)]);
        assert_eq!(s.get_i64("x"), Some(2));
        assert!(s.keys().contains(&"y".to_string()));
    }

    #[test]
    fn test_context_popped_on_error() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", 1);

        fn fails() -> std::result::Result<(), String> {
            Err("boom".to_string())
        }
        let run = || -> std::result::Result<(), String> {
            let _ctx = s.context([("x", 2)]);
            fails()?;
            Ok(())
        };
        assert!(run().is_err());
        assert_eq!(s.get_i64("x"), Some(1));
        assert_eq!(s.context_depth(), 0);
    }

    #[test]
    fn test_context_popped_on_panic() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.scoped([("x", 2)], || -> i32 { panic!("inside context") })
        }));
        assert!(result.is_err());
        assert_eq!(s.get_i64("x"), Some(1));
    }

    #[test]
    fn test_out_of_order_drop_removes_own_frame() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        let a = s.context([("x", 2)]);
        let b = s.context([("x", 3)]);
        drop(a);
        assert_eq!(s.get_i64("x"), Some(3));
        drop(b);
        assert_eq!(s.get("x"), None);
    }

    #[test]
    fn test_reset_and_default() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        let initial = s.get("datadir").unwrap();
        s.set("datadir", "/tmp/x");
        assert_eq!(s.get("datadir"), Some(json!("/tmp/x")));
        assert_eq!(s.default("datadir"), Some(initial.clone()));
        s.reset("datadir");
        assert_eq!(s.get("datadir"), Some(initial));

        s.set("new_key", true);
        s.reset("new_key");
        assert!(!s.contains("new_key"));
    }

    #[test]
    fn test_builder_values_not_in_defaults() {
        let temp = TempDir::new().unwrap();
        let s = Settings::builder()
            .module("pkg")
            .config_paths(ConfigPaths::default())
            .platform_dirs(PlatformDirs::under(temp.path()))
            .set("organism", 9606)
            .build()
            .unwrap();
        assert_eq!(s.get_i64("organism"), Some(9606));
        assert_eq!(s.default("organism"), None);
    }

    #[test]
    fn test_reset_all_clears_changes_and_contexts() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.set("x", 1);
        let guard = s.context([("y", 2)]);
        s.reset_all().unwrap();
        assert_eq!(s.get("x"), None);
        assert_eq!(s.context_depth(), 0);
        drop(guard);
        assert_eq!(s.context_depth(), 0);
        assert_eq!(s.get_str("module").as_deref(), Some("pkg"));
    }

    #[test]
    fn test_typed_accessors() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp);
        s.setup(json!({"n": 3, "f": 0.5, "b": true, "l": [1, 2]}).as_object().cloned().unwrap());
        assert_eq!(s.get_i64("n"), Some(3));
        assert_eq!(s.get_f64("f"), Some(0.5));
        assert_eq!(s.get_bool("b"), Some(true));
        assert_eq!(s.get_as::<Vec<u32>>("l"), Some(vec![1, 2]));
        assert_eq!(s.get_as::<String>("n"), None);
        assert!(s.get_path("cachedir").unwrap().is_dir());
    }
}
