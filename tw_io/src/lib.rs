pub mod archive;
pub mod cargo;
pub mod db;
pub mod editor;
pub mod git;
pub mod github;
pub mod mapping;
pub mod notes;
pub mod process;
pub mod progress;
pub mod publish;
pub mod tap;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use archive::{ArchiveBuilder, compute_sha256, copy_artifacts};
pub use cargo::{CargoBuilder, package_name};
pub use db::Database;
pub use editor::EditorCommand;
pub use git::GitCli;
pub use github::GhCli;
pub use notes::{NotesSource, compose_notes};
pub use progress::{ProgressCallback, PublishProgress};
pub use publish::{Collaborators, FormulaDetails, PublishOutcome, PublishRequest, ReleasePublisher};
pub use tap::{ImportReport, TapManager};
pub use traits::{BuildTool, ReleaseAsset, ReleaseHost, ReleaseNotes, ReleaseRequest, SourceControl, TextEditor};
