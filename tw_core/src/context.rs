//! Process-wide settings shared by every command.

use std::path::{Path, PathBuf};

/// On-disk layout under the tapwright root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root: `$HOME/.tapwright`, or `./.tapwright` without a home directory.
    pub fn default_root() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tapwright")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn database(&self) -> PathBuf {
        self.db_dir().join("tapwright.sqlite3")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Build output for one project, so publishes of different tools don't clobber each other.
    pub fn project_build_dir(&self, project_name: &str) -> PathBuf {
        self.build_dir().join(project_name)
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.root.join("notes")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Trace,
}

impl LogLevel {
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => LogLevel::Quiet,
            (false, 0) => LogLevel::Normal,
            (false, 1) => LogLevel::Verbose,
            (false, _) => LogLevel::Trace,
        }
    }

    /// Filter directive for the tracing subscriber.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "error",
            LogLevel::Normal => "warn",
            LogLevel::Verbose => "info,tw_io=debug,tw_cli=debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Settings resolved once at startup and handed to the commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: Paths,
    pub log_level: LogLevel,
}

impl Context {
    pub fn new(root: impl Into<PathBuf>, log_level: LogLevel) -> Self {
        Self {
            paths: Paths::new(root),
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_root() {
        let paths = Paths::new("/tmp/tw");
        assert_eq!(paths.database(), PathBuf::from("/tmp/tw/db/tapwright.sqlite3"));
        assert_eq!(paths.project_build_dir("mytool"), PathBuf::from("/tmp/tw/build/mytool"));
        assert_eq!(paths.notes_dir(), PathBuf::from("/tmp/tw/notes"));
    }

    #[test]
    fn log_level_from_flags() {
        assert_eq!(LogLevel::from_flags(0, false), LogLevel::Normal);
        assert_eq!(LogLevel::from_flags(1, false), LogLevel::Verbose);
        assert_eq!(LogLevel::from_flags(3, false), LogLevel::Trace);
        assert_eq!(LogLevel::from_flags(2, true), LogLevel::Quiet);
    }
}
