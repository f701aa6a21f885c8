//! Collaborator traits for the external tools a publish run drives.
//!
//! The pipeline only talks to these traits, so tests can inject mocks that
//! simulate build failures, rejected releases, empty editors, and so on.
//! Real implementations shell out to `cargo`, `git`, `gh` and `$EDITOR`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use tw_core::{Arch, Error};

/// Release notes handed to the release host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseNotes {
    Text(String),
    /// Let the host generate notes from the commit history.
    Generate,
}

/// A release to create on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub project_path: PathBuf,
    /// Tag and title of the release.
    pub version: String,
    /// Files uploaded as release assets, in artifact order.
    pub assets: Vec<PathBuf>,
    pub notes: ReleaseNotes,
}

/// An uploaded release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
}

/// Compiles a project for one architecture.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Build a release binary and return its path.
    ///
    /// Fails with `BuildFailed` when the compiler exits non-zero.
    async fn build(
        &self,
        project_path: &Path,
        arch: Arch,
        extra_args: &[String],
    ) -> Result<PathBuf, Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn remote_url(&self, repo: &Path) -> Result<String, Error>;

    /// Stage `files`, commit them with `message`, and push.
    async fn commit_and_push(&self, repo: &Path, files: &[PathBuf], message: &str)
    -> Result<(), Error>;

    /// Initialize a repository with an initial commit of its current contents.
    async fn init_repository(&self, repo: &Path) -> Result<(), Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Version of the latest release, with any leading `v` removed.
    async fn previous_release_version(&self, project_path: &Path) -> Result<Option<String>, Error>;

    /// Fails with `ReleaseConflict` when a release with this version exists.
    async fn create_release(&self, request: &ReleaseRequest) -> Result<(), Error>;

    async fn release_assets(&self, project_path: &Path, version: &str)
    -> Result<Vec<ReleaseAsset>, Error>;

    async fn latest_release_asset_url(&self, project_path: &Path) -> Result<Option<String>, Error>;

    /// Create a remote repository for `repo`, wire it up as `origin` and push.
    async fn create_repository(&self, repo: &Path, name: &str, private: bool) -> Result<(), Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextEditor: Send + Sync {
    /// Open `path` and wait for the editor to exit.
    async fn edit(&self, path: &Path) -> Result<(), Error>;
}
