//! Per-module sessions: one settings store and one logger per module.
//!
//! A [`SessionRegistry`] is created once by the application and handed to
//! whatever needs a session. Modules are identified explicitly by name;
//! `pkg.sub` and `pkg` share the session of the top-level package `pkg`.

use crate::error::Result;
use crate::logging::{LabeledLogger, Logger};
use crate::settings::{ConfigPaths, ModuleLocator, ModuleRoots, PlatformDirs, Settings};
use petname::{Generator, Petnames};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Top-level package of a dotted module name.
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// A short random human readable session label.
pub fn gen_session_id() -> String {
    Petnames::medium()
        .generate_one(2, "-")
        .unwrap_or_else(|| format!("s{}", chrono::Utc::now().timestamp_millis()))
}

/// Options applied to every session a registry builds.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Log file for all sessions, ahead of `<MODULE>_LOGFILE`
    pub logfile: Option<PathBuf>,
    /// Directory for per-module log files, ahead of the `logdir` setting
    pub logdir: Option<PathBuf>,
    /// Search directories instead of the discovered ones
    pub config_paths: Option<ConfigPaths>,
    /// Platform roots instead of the discovered ones
    pub platform_dirs: Option<PlatformDirs>,
}

/// The settings and logger of one module.
#[derive(Debug)]
pub struct Session {
    module: String,
    label: String,
    settings: Arc<Settings>,
    log: Arc<Logger>,
}

impl Session {
    /// Build settings for a module and open its log file.
    pub fn start(
        module: &str,
        locator: Arc<dyn ModuleLocator>,
        options: &SessionOptions,
    ) -> Result<Self> {
        let mut builder = Settings::builder().module(module).locator(locator);
        if let Some(paths) = &options.config_paths {
            builder = builder.config_paths(paths.clone());
        }
        if let Some(dirs) = &options.platform_dirs {
            builder = builder.platform_dirs(dirs.clone());
        }
        let settings = Arc::new(builder.build()?);

        let log = Arc::new(Logger::for_settings(
            &settings,
            module,
            options.logfile.clone(),
            options.logdir.as_deref(),
        )?);

        let label = gen_session_id();
        log.msg(&format!("Session `{label}` started."), Some(module), 0);
        info!("Session {} started for {}", label, module);

        Ok(Self {
            module: module.to_string(),
            label,
            settings,
            log,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn log(&self) -> &Arc<Logger> {
        &self.log
    }

    /// A logger handle labelling messages with `name`.
    pub fn logger(&self, name: impl Into<String>) -> LabeledLogger {
        self.log.labeled(name)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.log.msg(
            &format!("Session `{}` finished.", self.label),
            Some(&self.module),
            0,
        );
    }
}

/// Process-wide table of sessions, one per top-level module.
#[derive(Debug)]
pub struct SessionRegistry {
    locator: Arc<dyn ModuleLocator>,
    options: SessionOptions,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ModuleRoots::default()))
    }
}

impl SessionRegistry {
    pub fn new(locator: Arc<dyn ModuleLocator>) -> Self {
        Self::with_options(locator, SessionOptions::default())
    }

    pub fn with_options(locator: Arc<dyn ModuleLocator>, options: SessionOptions) -> Self {
        Self {
            locator,
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session of a module, built on first request.
    ///
    /// Repeated calls return the same session until [`Self::new_session`]
    /// replaces it.
    pub fn session(&self, module: &str) -> Result<Arc<Session>> {
        let name = top_level(module);
        let mut sessions = self.sessions();

        if let Some(session) = sessions.get(name) {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::start(name, Arc::clone(&self.locator), &self.options)?);
        sessions.insert(name.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Build a fresh session for a module, discarding any previous one.
    ///
    /// Holders of the old session keep a working but orphaned copy; its
    /// logger writes to its own file until the last reference is dropped.
    pub fn new_session(&self, module: &str) -> Result<Arc<Session>> {
        let name = top_level(module);
        let session = Arc::new(Session::start(name, Arc::clone(&self.locator), &self.options)?);

        if self
            .sessions()
            .insert(name.to_string(), Arc::clone(&session))
            .is_some()
        {
            debug!("Replaced session of {}", name);
        }
        Ok(session)
    }

    /// The session of a module, if one was built.
    pub fn get(&self, module: &str) -> Option<Arc<Session>> {
        self.sessions().get(top_level(module)).cloned()
    }

    /// Settings of a module's session.
    pub fn settings(&self, module: &str) -> Result<Arc<Settings>> {
        Ok(Arc::clone(self.session(module)?.settings()))
    }

    /// Logger of a module's session.
    pub fn log(&self, module: &str) -> Result<Arc<Logger>> {
        Ok(Arc::clone(self.session(module)?.log()))
    }

    /// Modules with a session, sorted.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
