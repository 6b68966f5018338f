//! Candidate config file discovery.
//!
//! A module's settings may live in four location classes, highest priority
//! first: the working directory, the platform user config directory, the
//! legacy `~/.<module>` directory and the module's bundled `data` directory.
//! Each class contributes one candidate per file name stem and extension.
//! Candidates are not checked for existence here.

use regex_lite::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// Recognised config file extensions.
pub const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Plain config file name stems.
pub const NAME_STEMS: [&str; 2] = ["settings", "config"];

const SEPARATORS: [char; 2] = ['-', '_'];

static DOTTED_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("dotted identifier pattern is valid")
});

/// Finds where a module lives on disk.
///
/// Rust has no import system to ask, so callers register module locations
/// up front. A module's bundled data directory is `<module path>/data`.
pub trait ModuleLocator: fmt::Debug + Send + Sync {
    /// Base directory of a module, `None` if unknown or unreadable.
    ///
    /// Dotted names (`pkg.sub`) address subdirectories of the top-level
    /// package.
    fn module_path(&self, module: &str) -> Option<PathBuf>;

    /// The `data` directory shipped with a module.
    fn module_datadir(&self, module: &str) -> Option<PathBuf> {
        self.module_path(module).map(|p| p.join("data"))
    }
}

/// Table of top-level module names to their base directories.
#[derive(Debug, Clone, Default)]
pub struct ModuleRoots {
    roots: HashMap<String, PathBuf>,
}

impl ModuleRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module's base directory.
    pub fn with(mut self, module: impl Into<String>, basedir: impl Into<PathBuf>) -> Self {
        self.insert(module, basedir);
        self
    }

    pub fn insert(&mut self, module: impl Into<String>, basedir: impl Into<PathBuf>) {
        self.roots.insert(module.into(), basedir.into());
    }
}

impl ModuleLocator for ModuleRoots {
    fn module_path(&self, module: &str) -> Option<PathBuf> {
        let mut parts = module.split('.');
        let top = parts.next()?;
        let base = self.roots.get(top)?;
        let path = parts.fold(base.clone(), |acc, part| acc.join(part));
        path.is_dir().then_some(path)
    }
}

/// The directories searched for config files, apart from the module's own.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Usually the current working directory
    pub working_dir: Option<PathBuf>,
    /// Platform user config directory for the module
    pub user_dir: Option<PathBuf>,
    /// Legacy `~/.<module>` directory
    pub legacy_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover the search directories for a module.
    ///
    /// Without a module only the working directory is searched.
    pub fn discover(module: Option<&str>, author: Option<&str>) -> Self {
        let working_dir = std::env::current_dir().ok();

        let Some(module) = module else {
            return Self {
                working_dir,
                ..Self::default()
            };
        };

        let user_dir = dirs::config_dir().map(|d| {
            // Only Windows nests app directories under an author directory
            match author {
                Some(author) if cfg!(windows) => d.join(author).join(module),
                _ => d.join(module),
            }
        });
        let legacy_dir = dirs::home_dir().map(|h| h.join(format!(".{module}")));

        Self {
            working_dir,
            user_dir,
            legacy_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(
        working_dir: Option<PathBuf>,
        user_dir: Option<PathBuf>,
        legacy_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            working_dir,
            user_dir,
            legacy_dir,
        }
    }
}

/// Where a candidate path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Path given by the caller
    Explicit,
    /// Data directory of a module referenced by dotted name
    ModuleRef,
    WorkingDir,
    UserConfig,
    Legacy,
    /// The module's bundled data directory
    Builtin,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Explicit => write!(f, "explicit"),
            CandidateSource::ModuleRef => write!(f, "module"),
            CandidateSource::WorkingDir => write!(f, "working dir"),
            CandidateSource::UserConfig => write!(f, "user"),
            CandidateSource::Legacy => write!(f, "legacy"),
            CandidateSource::Builtin => write!(f, "builtin"),
        }
    }
}

/// A config file path that may or may not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub source: CandidateSource,
}

impl Candidate {
    fn new(path: PathBuf, source: CandidateSource) -> Self {
        Self { path, source }
    }
}

/// File name stems searched for a module, in priority order.
///
/// `settings` and `config` always come first, followed by every
/// module-prefixed and module-suffixed variant with `-` and `_`.
pub fn fname_stems(module: Option<&str>) -> Vec<String> {
    let mut stems: Vec<String> = NAME_STEMS.iter().map(|s| s.to_string()).collect();

    if let Some(module) = module {
        for stem in NAME_STEMS {
            for sep in SEPARATORS {
                stems.push(format!("{module}{sep}{stem}"));
                stems.push(format!("{stem}{sep}{module}"));
            }
        }
    }

    stems
}

/// File names searched for a module: every stem with every extension.
pub fn fnames(module: Option<&str>) -> Vec<String> {
    fname_stems(module)
        .into_iter()
        .flat_map(|stem| EXTENSIONS.iter().map(move |ext| format!("{stem}.{ext}")))
        .collect()
}

/// Whether a string looks like `pkg` or `pkg.sub.mod`.
pub fn is_dotted_module(name: &str) -> bool {
    DOTTED_IDENT.is_match(name)
}

/// Computes the ordered candidate list for one module.
#[derive(Debug, Clone)]
pub struct PathResolver {
    module: Option<String>,
    dirs: ConfigPaths,
    locator: Arc<dyn ModuleLocator>,
}

impl PathResolver {
    pub fn new(
        module: Option<String>,
        dirs: ConfigPaths,
        locator: Arc<dyn ModuleLocator>,
    ) -> Self {
        Self {
            module,
            dirs,
            locator,
        }
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn dirs(&self) -> &ConfigPaths {
        &self.dirs
    }

    /// Base directory of the module, if the locator knows it.
    pub fn module_basedir(&self) -> Option<PathBuf> {
        self.module
            .as_deref()
            .and_then(|m| self.locator.module_path(m))
    }

    /// The module's bundled data directory.
    pub fn module_datadir(&self) -> Option<PathBuf> {
        self.module
            .as_deref()
            .and_then(|m| self.locator.module_datadir(m))
    }

    /// File names searched in each directory.
    pub fn fnames(&self) -> Vec<String> {
        fnames(self.module.as_deref())
    }

    fn in_dir(&self, dir: &Path, source: CandidateSource) -> impl Iterator<Item = Candidate> {
        let dir = dir.to_path_buf();
        self.fnames()
            .into_iter()
            .map(move |f| Candidate::new(dir.join(f), source))
    }

    /// Candidates from the selected location classes, highest priority first.
    pub fn paths_in(&self, wd: bool, user: bool, legacy: bool, builtin: bool) -> Vec<Candidate> {
        let module_datadir = self.module_datadir();
        let classes = [
            (wd, self.dirs.working_dir.as_deref(), CandidateSource::WorkingDir),
            (user, self.dirs.user_dir.as_deref(), CandidateSource::UserConfig),
            (legacy, self.dirs.legacy_dir.as_deref(), CandidateSource::Legacy),
            (builtin, module_datadir.as_deref(), CandidateSource::Builtin),
        ];

        classes
            .into_iter()
            .filter(|(enabled, _, _)| *enabled)
            .filter_map(|(_, dir, source)| dir.map(|d| (d, source)))
            .flat_map(|(dir, source)| self.in_dir(dir, source).collect::<Vec<_>>())
            .collect()
    }

    /// Expand caller-supplied entries.
    ///
    /// Existing files are kept verbatim. Entries that are not files but name
    /// a known module expand to that module's data directory candidates.
    /// Anything else is kept verbatim and skipped later if it does not exist.
    pub fn explicit(&self, paths: &[PathBuf]) -> Vec<Candidate> {
        let mut out = Vec::new();

        for path in paths {
            if !path.is_file()
                && let Some(name) = path.to_str()
                && is_dotted_module(name)
                && let Some(datadir) = self.locator.module_datadir(name)
            {
                let top = name.split('.').next();
                out.extend(
                    fnames(top)
                        .into_iter()
                        .map(|f| Candidate::new(datadir.join(f), CandidateSource::ModuleRef)),
                );
                continue;
            }
            out.push(Candidate::new(path.clone(), CandidateSource::Explicit));
        }

        out
    }

    /// All candidates: explicit entries first, then every location class.
    pub fn resolve(&self, explicit: &[PathBuf]) -> Vec<Candidate> {
        let mut out = self.explicit(explicit);
        out.extend(self.paths_in(true, true, true, true));
        out
    }
}
