//! Session log files.
//!
//! A [`Logger`] is bound to one file and shared by everything in a session.
//! Each message carries a numeric level; it goes to the file when the level
//! is at or below the file verbosity, and is echoed to stdout when at or
//! below the console verbosity. Every message is also forwarded to
//! `tracing` so an installed subscriber sees it.
//!
//! Writes are buffered. A background thread flushes the buffer every
//! `log_flush_interval`, so an idle session's log still reaches the disk;
//! with a zero interval every write is flushed at once.

use crate::error::{Result, SettingsError};
use crate::settings::{Settings, create_dir};
use heck::ToShoutySnakeCase;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Hanging indent of wrapped lines, the width of the timestamp prefix.
const WRAP_INDENT: usize = 22;

/// Verbosity threshold that can be changed while the logger is in use.
///
/// Messages with a level at or below the threshold pass.
#[derive(Debug)]
pub struct LevelThreshold(AtomicI64);

impl LevelThreshold {
    pub fn new(level: i64) -> Self {
        Self(AtomicI64::new(level))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, level: i64) {
        self.0.store(level, Ordering::Relaxed);
    }

    pub fn should_log(&self, level: i64) -> bool {
        level <= self.get()
    }
}

/// Logger parameters, usually read from settings.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// `log_verbosity`: highest level written to the file
    pub verbosity: i64,
    /// `console_verbosity`: highest level echoed to stdout
    pub console_level: i64,
    /// `log_flush_interval`: buffered lines reach the file within this long
    pub flush_interval: Duration,
    /// Lines longer than this are wrapped
    pub max_width: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            console_level: -1,
            flush_interval: Duration::from_secs(2),
            max_width: 200,
        }
    }
}

impl LoggerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: settings.get_i64("log_verbosity").unwrap_or(defaults.verbosity),
            console_level: settings
                .get_i64("console_verbosity")
                .unwrap_or(defaults.console_level),
            flush_interval: settings
                .get_f64("log_flush_interval")
                .filter(|s| *s >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.flush_interval),
            max_width: defaults.max_width,
        }
    }
}

/// Name of the environment variable that redirects a module's log file.
///
/// `pypath` reads `PYPATH_LOGFILE`, `omnipath-common` reads
/// `OMNIPATH_COMMON_LOGFILE`.
pub fn logfile_env_var(module: &str) -> String {
    format!("{}_LOGFILE", module.to_shouty_snake_case())
}

/// Default log file name: `<name>__<YYYY-MM-DD_HH.MM.SS>.log`.
pub fn default_file_name(name: &str) -> String {
    format!(
        "{}__{}.log",
        name,
        chrono::Local::now().format("%Y-%m-%d_%H.%M.%S")
    )
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Greedy word wrap. Words longer than the width are kept whole.
fn wrap(text: &str, width: usize) -> String {
    let indent = " ".repeat(WRAP_INDENT);
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let extra = if line.is_empty() { 0 } else { 1 };
        if !line.is_empty() && line.chars().count() + extra + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
            line.push_str(&indent);
        } else if extra == 1 && !line.ends_with(' ') {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

#[derive(Debug)]
struct LogFile {
    writer: Option<BufWriter<File>>,
    last_flush: Instant,
}

impl LogFile {
    fn flush(&mut self, path: &Path) {
        if let Some(writer) = self.writer.as_mut()
            && let Err(e) = writer.flush()
        {
            warn!("Failed to flush log file {:?}: {}", path, e);
        }
        self.last_flush = Instant::now();
    }
}

/// Start the thread flushing `file` every `interval`.
///
/// The thread exits once the returned sender is dropped or the file is gone.
fn spawn_flusher(
    file: Weak<Mutex<LogFile>>,
    path: PathBuf,
    interval: Duration,
) -> Option<Sender<()>> {
    let (tx, rx) = mpsc::channel::<()>();

    let thread_path = path.clone();
    let spawned = thread::Builder::new()
        .name("log-flush".into())
        .spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(interval) {
                let Some(file) = file.upgrade() else {
                    break;
                };
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                if file.last_flush.elapsed() >= interval {
                    file.flush(&thread_path);
                }
            }
        });

    match spawned {
        Ok(_) => Some(tx),
        Err(e) => {
            warn!("Failed to start log flush thread for {:?}: {}", path, e);
            None
        }
    }
}

/// A log file shared by one session.
#[derive(Debug)]
pub struct Logger {
    path: PathBuf,
    verbosity: LevelThreshold,
    console_level: LevelThreshold,
    flush_interval: Duration,
    max_width: usize,
    file: Arc<Mutex<LogFile>>,
    /// Dropping this stops the flush thread
    _flusher: Option<Sender<()>>,
}

impl Logger {
    /// Open (truncate) a log file; its parent directory is created.
    pub fn open(path: impl Into<PathBuf>, config: LoggerConfig) -> Result<Self> {
        let path = std::path::absolute(path.into())
            .map_err(|e| SettingsError::log_file(Path::new(""), e))?;
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        let file = File::create(&path).map_err(|e| SettingsError::log_file(&path, e))?;
        let file = Arc::new(Mutex::new(LogFile {
            writer: Some(BufWriter::new(file)),
            last_flush: Instant::now(),
        }));

        let flusher = if config.flush_interval.is_zero() {
            None
        } else {
            spawn_flusher(Arc::downgrade(&file), path.clone(), config.flush_interval)
        };

        let logger = Self {
            verbosity: LevelThreshold::new(config.verbosity),
            console_level: LevelThreshold::new(config.console_level),
            flush_interval: config.flush_interval,
            max_width: config.max_width,
            file,
            _flusher: flusher,
            path,
        };

        logger.msg("Welcome!", None, 0);
        logger.msg(
            &format!("Logger started, logging into `{}`.", logger.path.display()),
            None,
            0,
        );
        Ok(logger)
    }

    /// Open the log file for a module's session.
    ///
    /// The path is `logfile` if given, else the `<MODULE>_LOGFILE`
    /// environment variable, else `<logdir>/<name>__<timestamp>.log`. The
    /// directory is `logdir` if given, else the `logdir` setting, else
    /// `<name>_log` in the working directory.
    pub fn for_settings(
        settings: &Settings,
        name: &str,
        logfile: Option<PathBuf>,
        logdir: Option<&Path>,
    ) -> Result<Self> {
        let path = logfile
            .or_else(|| std::env::var_os(logfile_env_var(name)).map(PathBuf::from))
            .unwrap_or_else(|| {
                let logdir = logdir
                    .map(Path::to_path_buf)
                    .or_else(|| settings.get_path("logdir"))
                    .unwrap_or_else(|| PathBuf::from(format!("{name}_log")));
                logdir.join(default_file_name(name))
            });

        Self::open(path, LoggerConfig::from_settings(settings))
    }

    fn file(&self) -> MutexGuard<'_, LogFile> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verbosity(&self) -> &LevelThreshold {
        &self.verbosity
    }

    pub fn console_level(&self) -> &LevelThreshold {
        &self.console_level
    }

    fn format(&self, message: &str, label: Option<&str>) -> String {
        let text = match label {
            Some(label) if !label.is_empty() => format!("[{label}] {message}"),
            _ => message.to_string(),
        };
        format!("[{}] {}\n", timestamp(), wrap(&text, self.max_width))
    }

    /// Write a message.
    ///
    /// Goes to the file if `level` is within the file verbosity and to
    /// stdout if within the console verbosity.
    pub fn msg(&self, message: &str, label: Option<&str>, level: i64) {
        tracing::trace!(label = label.unwrap_or(""), level, "{}", message);

        let to_file = self.verbosity.should_log(level);
        let to_console = self.console_level.should_log(level);
        if !to_file && !to_console {
            return;
        }

        let line = self.format(message, label);

        if to_file {
            let mut file = self.file();
            if let Some(writer) = file.writer.as_mut() {
                if let Err(e) = writer.write_all(line.as_bytes()) {
                    warn!("Failed to write log file {:?}: {}", self.path, e);
                }
                if file.last_flush.elapsed() >= self.flush_interval {
                    file.flush(&self.path);
                }
            }
        }

        if to_console {
            print!("{line}");
            let _ = std::io::stdout().flush();
        }
    }

    /// Write a message to the file and always echo it to stdout.
    pub fn console(&self, message: &str, label: Option<&str>) {
        let level = self.console_level.get().min(self.verbosity.get());
        self.msg(message, label, level);
    }

    pub fn flush(&self) {
        self.file().flush(&self.path);
    }

    /// Flush and close the file; later messages only reach the console.
    pub fn close(&self) {
        let mut file = self.file();
        file.flush(&self.path);
        file.writer = None;
    }

    pub fn is_closed(&self) -> bool {
        self.file().writer.is_none()
    }

    /// A handle that labels every message with `name`.
    pub fn labeled(self: &Arc<Self>, name: impl Into<String>) -> LabeledLogger {
        LabeledLogger {
            logger: Arc::clone(self),
            name: name.into(),
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        self.msg(
            &format!("Logger shut down, logfile `{}` closed.", self.path.display()),
            None,
            0,
        );
        self.msg("Bye.", None, 0);
        self.close();
    }
}

/// A logger handle for one component, prepending its name to messages.
#[derive(Debug, Clone)]
pub struct LabeledLogger {
    logger: Arc<Logger>,
    name: String,
}

impl LabeledLogger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn log(&self, message: &str, level: i64) {
        self.logger.msg(message, Some(&self.name), level);
    }

    pub fn console(&self, message: &str) {
        self.logger.console(message, Some(&self.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(verbosity: i64) -> LoggerConfig {
        LoggerConfig {
            verbosity,
            flush_interval: Duration::ZERO,
            ..LoggerConfig::default()
        }
    }

    #[test]
    fn test_level_threshold() {
        let t = LevelThreshold::new(1);
        assert!(t.should_log(0));
        assert!(t.should_log(1));
        assert!(!t.should_log(2));
        t.set(-1);
        assert!(!t.should_log(0));
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(logfile_env_var("pypath"), "PYPATH_LOGFILE");
        assert_eq!(logfile_env_var("omnipath-common"), "OMNIPATH_COMMON_LOGFILE");
    }

    #[test]
    fn test_default_file_name_shape() {
        let name = default_file_name("pypath");
        assert!(name.starts_with("pypath__"));
        assert!(name.ends_with(".log"));
        assert!(!name.contains(' ') && !name.contains(':'));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("a b c", 200), "a b c");
        let wrapped = wrap("aaaa bbbb cccc", 9);
        assert_eq!(wrapped, format!("aaaa bbbb\n{}cccc", " ".repeat(WRAP_INDENT)));
        assert_eq!(wrap("toolongword", 3), "toolongword");
    }

    #[test]
    fn test_levels_filter_file_output() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("test.log");
        let logger = Logger::open(&path, config(1)).unwrap();

        logger.msg("kept", Some("db"), 1);
        logger.msg("dropped", Some("db"), 2);
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Welcome!"));
        assert!(content.contains("[db] kept"));
        assert!(!content.contains("dropped"));
    }

    #[test]
    fn test_drop_writes_farewell() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.log");
        {
            let logger = Arc::new(Logger::open(&path, config(0)).unwrap());
            logger.labeled("Resource").log("hello", 0);
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[Resource] hello"));
        assert!(content.trim_end().ends_with("Bye."));
    }

    #[test]
    fn test_idle_logger_flushes_on_interval() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.log");
        let logger = Logger::open(
            &path,
            LoggerConfig {
                flush_interval: Duration::from_millis(100),
                ..LoggerConfig::default()
            },
        )
        .unwrap();

        logger.msg("important line", None, 0);
        std::thread::sleep(Duration::from_millis(800));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("important line"));
    }

    #[test]
    fn test_zero_interval_flushes_every_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.log");
        let logger = Logger::open(&path, config(0)).unwrap();

        logger.msg("right away", None, 0);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("right away"));
    }

    #[test]
    fn test_close_stops_file_output() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.log");
        let logger = Logger::open(&path, config(0)).unwrap();
        logger.close();
        assert!(logger.is_closed());
        logger.msg("after close", None, 0);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("after close"));
    }
}
