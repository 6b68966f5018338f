//! CLI command definitions for omnipath-settings
//!
//! A small diagnostic tool: shows where settings for a module are looked up,
//! which files were read and what the merged result is. The main entry point
//! is the `Cli` struct which contains subcommands.

use crate::misc::table_format;
use crate::settings::{ModuleRoots, Settings};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Inspect layered module settings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Module whose settings are resolved
    #[arg(short, long, global = true)]
    pub module: Option<String>,

    /// Extra config file or dotted module name, highest priority first
    #[arg(short, long = "path", global = true)]
    pub paths: Vec<PathBuf>,

    /// Base directory of the module; bundled defaults live in `<dir>/data`
    #[arg(long, global = true)]
    pub module_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print the merged settings as YAML (default if no subcommand given)
    Show,

    /// List every candidate config path in priority order
    Paths,

    /// List the config files that were read, in the order read
    Parsed,
}

impl Cli {
    /// Build the settings store described by the arguments.
    ///
    /// Note that building materializes the directory settings on disk.
    pub fn settings(&self) -> Result<Settings> {
        let mut roots = ModuleRoots::new();
        if let (Some(module), Some(dir)) = (&self.module, &self.module_dir) {
            roots.insert(module.clone(), dir.clone());
        }

        let mut builder = Settings::builder()
            .paths(self.paths.iter().cloned())
            .locator(Arc::new(roots));
        if let Some(module) = &self.module {
            builder = builder.module(module.clone());
        }

        builder.build().context("Failed to load settings")
    }

    /// Run the selected command and return its output.
    pub fn run(&self) -> Result<String> {
        let settings = self.settings()?;

        match self.command.unwrap_or(Command::Show) {
            Command::Show => {
                let yaml = serde_yaml::to_string(&Value::Object(settings.as_map()))?;
                Ok(yaml)
            }
            Command::Paths => {
                let rows: Vec<Vec<String>> = settings
                    .candidates()
                    .into_iter()
                    .map(|c| {
                        vec![
                            (if c.path.is_file() { "*" } else { "" }).to_string(),
                            c.source.to_string(),
                            c.path.display().to_string(),
                        ]
                    })
                    .collect();
                Ok(table_format(&["", "source", "path"], &rows))
            }
            Command::Parsed => Ok(settings
                .parsed_files()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from([
            "omnipath-settings",
            "--module",
            "pypath",
            "--path",
            "a.yaml",
            "-p",
            "b.yaml",
            "paths",
        ]);
        assert_eq!(cli.module.as_deref(), Some("pypath"));
        assert_eq!(cli.paths, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
        assert_eq!(cli.command, Some(Command::Paths));
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["omnipath-settings"]);
        assert_eq!(cli.command, None);
        assert!(!cli.verbose);
    }
}
