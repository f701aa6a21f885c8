use std::fmt;
use std::path::PathBuf;

/// Pipeline stages of a publish run, used to tag errors with where they happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishStage {
    ResolveVersion,
    Build,
    ComposeReleaseNotes,
    CreateRemoteRelease,
    UpdateOrCreateFormula,
    WriteAndCommitFormulaDocument,
}

impl PublishStage {
    pub fn label(&self) -> &'static str {
        match self {
            PublishStage::ResolveVersion => "resolve version",
            PublishStage::Build => "build",
            PublishStage::ComposeReleaseNotes => "compose release notes",
            PublishStage::CreateRemoteRelease => "create remote release",
            PublishStage::UpdateOrCreateFormula => "update formula record",
            PublishStage::WriteAndCommitFormulaDocument => "write and commit formula",
        }
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse error classes surfaced to operators and used for exit reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    PersistenceConflict,
    BuildFailure,
    ChecksumMissing,
    RemoteReleaseConflict,
    ReleaseNotesEmpty,
    ToolUnavailable,
    ExternalCommand,
    Storage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    InvalidVersionNumber {
        version: String,
    },
    NoPreviousVersionToIncrement,
    InvalidInput {
        message: String,
    },
    DuplicateTap {
        field: &'static str,
        value: String,
    },
    DuplicateFormula {
        tap: String,
        name: String,
    },
    MissingTap {
        name: String,
    },
    MissingFormula {
        name: String,
    },
    BuildFailed {
        target: String,
        code: Option<i32>,
        output: String,
    },
    MissingSha256 {
        artifact: String,
    },
    MissingGitHubUsername {
        remote: String,
    },
    ReleaseConflict {
        version: String,
        message: String,
    },
    EmptyFileAfterRetry {
        path: PathBuf,
    },
    ReleaseNotesEmpty,
    ToolUnavailable {
        tool: String,
    },
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    StoreCorruption {
        message: String,
    },
    Io {
        path: PathBuf,
        message: String,
    },
    Stage {
        stage: PublishStage,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the pipeline stage it came from.
    ///
    /// Already-tagged errors keep their original stage.
    pub fn at(self, stage: PublishStage) -> Error {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// The innermost error, with any stage tags peeled off.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<PublishStage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidVersionNumber { .. }
            | Error::NoPreviousVersionToIncrement
            | Error::InvalidInput { .. }
            | Error::MissingGitHubUsername { .. } => ErrorKind::InvalidInput,
            Error::DuplicateTap { .. }
            | Error::DuplicateFormula { .. }
            | Error::MissingTap { .. }
            | Error::MissingFormula { .. } => ErrorKind::PersistenceConflict,
            Error::BuildFailed { .. } => ErrorKind::BuildFailure,
            Error::MissingSha256 { .. } => ErrorKind::ChecksumMissing,
            Error::ReleaseConflict { .. } => ErrorKind::RemoteReleaseConflict,
            Error::EmptyFileAfterRetry { .. } | Error::ReleaseNotesEmpty => {
                ErrorKind::ReleaseNotesEmpty
            }
            Error::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            Error::CommandFailed { .. } => ErrorKind::ExternalCommand,
            Error::StoreCorruption { .. } | Error::Io { .. } => ErrorKind::Storage,
            Error::Stage { source, .. } => source.kind(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidVersionNumber { version } => {
                write!(
                    f,
                    "invalid version number '{}'\n  hint: use major.minor.patch, e.g. 1.4.2 or 2.0.0-rc.1",
                    version
                )
            }
            Error::NoPreviousVersionToIncrement => {
                write!(
                    f,
                    "no previous release to increment\n  hint: pass an explicit version for the first release"
                )
            }
            Error::InvalidInput { message } => write!(f, "invalid input: {}", message),
            Error::DuplicateTap { field, value } => {
                write!(
                    f,
                    "a tap with {} '{}' already exists\n  hint: run 'tw brew tap-list' to see registered taps",
                    field, value
                )
            }
            Error::DuplicateFormula { tap, name } => {
                write!(f, "formula '{}' already exists in tap '{}'", name, tap)
            }
            Error::MissingTap { name } => {
                write!(
                    f,
                    "tap '{}' not found\n  hint: run 'tw brew import-tap <path>' or 'tw brew create-tap {}'",
                    name, name
                )
            }
            Error::MissingFormula { name } => write!(f, "formula '{}' not found", name),
            Error::BuildFailed {
                target,
                code,
                output,
            } => {
                write!(f, "build failed for {}", target)?;
                if let Some(code) = code {
                    write!(f, " (exit code {})", code)?;
                }
                let output = output.trim();
                if !output.is_empty() {
                    write!(f, "\n{}", output)?;
                }
                Ok(())
            }
            Error::MissingSha256 { artifact } => {
                write!(
                    f,
                    "no sha256 checksum computed for '{}'\n  hint: artifacts must be archived before the formula is rendered",
                    artifact
                )
            }
            Error::MissingGitHubUsername { remote } => {
                write!(
                    f,
                    "cannot determine a GitHub owner from remote '{}'\n  hint: the tap remote should look like https://github.com/<user>/homebrew-<tap>",
                    remote
                )
            }
            Error::ReleaseConflict { version, message } => {
                write!(
                    f,
                    "release '{}' was rejected by the release host: {}\n  hint: a release with this tag probably exists already; pick a new version",
                    version,
                    message.trim()
                )
            }
            Error::EmptyFileAfterRetry { path } => {
                write!(
                    f,
                    "release notes file '{}' is still empty after editing",
                    path.display()
                )
            }
            Error::ReleaseNotesEmpty => {
                write!(
                    f,
                    "release notes are empty\n  hint: pass --notes-file or --edit-notes to write them in an editor"
                )
            }
            Error::ToolUnavailable { tool } => {
                write!(
                    f,
                    "required tool '{}' is not installed or not on PATH",
                    tool
                )
            }
            Error::CommandFailed {
                command,
                code,
                stderr,
            } => {
                write!(f, "command '{}' failed", command)?;
                if let Some(code) = code {
                    write!(f, " with exit code {}", code)?;
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            Error::StoreCorruption { message } => {
                write!(f, "tap store error: {}", message)
            }
            Error::Io { path, message } => {
                write!(f, "{}: {}", path.display(), message)
            }
            Error::Stage { stage, source } => {
                write!(f, "{} failed: {}", stage, source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_version_display_includes_hint() {
        let err = Error::InvalidVersionNumber {
            version: "1.x".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("1.x"));
        assert!(msg.contains("hint:"));
    }

    #[test]
    fn stage_wrapping_names_the_stage() {
        let err = Error::BuildFailed {
            target: "aarch64-apple-darwin".to_string(),
            code: Some(101),
            output: "error[E0425]".to_string(),
        }
        .at(PublishStage::Build);

        let msg = err.to_string();
        assert!(msg.starts_with("build failed: "));
        assert!(msg.contains("exit code 101"));
        assert_eq!(err.stage(), Some(PublishStage::Build));
        assert_eq!(err.kind(), ErrorKind::BuildFailure);
    }

    #[test]
    fn restaging_keeps_first_stage() {
        let err = Error::ReleaseNotesEmpty
            .at(PublishStage::ComposeReleaseNotes)
            .at(PublishStage::CreateRemoteRelease);

        assert_eq!(err.stage(), Some(PublishStage::ComposeReleaseNotes));
        assert_eq!(err.root_cause(), &Error::ReleaseNotesEmpty);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            Error::MissingTap {
                name: "nntools".into()
            }
            .kind(),
            ErrorKind::PersistenceConflict
        );
        assert_eq!(
            Error::ToolUnavailable { tool: "gh".into() }.kind(),
            ErrorKind::ToolUnavailable
        );
        assert_eq!(
            Error::EmptyFileAfterRetry {
                path: PathBuf::from("notes.md")
            }
            .kind(),
            ErrorKind::ReleaseNotesEmpty
        );
        assert_eq!(
            Error::MissingSha256 {
                artifact: "mytool".into()
            }
            .kind(),
            ErrorKind::ChecksumMissing
        );
    }

    #[test]
    fn missing_tap_display_suggests_import() {
        let err = Error::MissingTap {
            name: "nntools".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("nntools"));
        assert!(msg.contains("import-tap"));
    }
}
