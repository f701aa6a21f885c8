//! Test utilities for tapwright
//!
//! In-process stand-ins for the external tools, so integration tests can run
//! whole workflows without cargo, git, gh or an editor:
//!
//! - `TestContext` - temp root, in-memory store and a set of fakes
//! - `FakeBuildTool` - "compiles" by writing a small file per architecture
//! - `FakeSourceControl` - records commits, answers with a fixed remote
//! - `FakeReleaseHost` - keeps releases in memory and rejects duplicate tags
//! - `FakeEditor` - writes scripted text on each open
//!
//! # Example
//!
//! ```ignore
//! use tw_io::test_utils::TestContext;
//!
//! #[tokio::test]
//! async fn test_publish() {
//!     let mut ctx = TestContext::new();
//!     let tap_dir = ctx.write_tap("nntools", &[("mytool", MYTOOL_RB)]);
//!     ctx.tap_manager().import_tap(&tap_dir).await.unwrap();
//!
//!     ctx.publisher().publish(ctx.publish_request("nntools", "mytool", "1.0.1")).await.unwrap();
//!     assert_eq!(ctx.db.formula_count().unwrap(), 1);
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use tw_core::{Arch, BuildConfig, Error, GitHubRemote, Paths, ReleaseVersionInfo};

use crate::db::Database;
use crate::notes::NotesSource;
use crate::publish::{Collaborators, FormulaDetails, PublishRequest, ReleasePublisher};
use crate::tap::TapManager;
use crate::traits::{
    BuildTool, ReleaseAsset, ReleaseHost, ReleaseRequest, SourceControl, TextEditor,
};

// ============================================================================
// Fakes
// ============================================================================

/// Writes `<out>/<triple>/<binary>` containing the arch label.
pub struct FakeBuildTool {
    out_dir: PathBuf,
    binary: String,
    /// Architectures to fail, with the exit code to report.
    pub failures: Mutex<BTreeMap<Arch, i32>>,
    pub builds: Mutex<Vec<(PathBuf, Arch, Vec<String>)>>,
}

impl FakeBuildTool {
    pub fn new(out_dir: impl Into<PathBuf>, binary: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            binary: binary.into(),
            failures: Mutex::new(BTreeMap::new()),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_for(&self, arch: Arch, code: i32) {
        self.failures.lock().unwrap().insert(arch, code);
    }
}

#[async_trait]
impl BuildTool for FakeBuildTool {
    async fn build(&self, project_path: &Path, arch: Arch, extra_args: &[String]) -> Result<PathBuf, Error> {
        self.builds
            .lock()
            .unwrap()
            .push((project_path.to_path_buf(), arch, extra_args.to_vec()));

        if let Some(code) = self.failures.lock().unwrap().get(&arch) {
            return Err(Error::BuildFailed {
                target: arch.rust_triple().to_string(),
                code: Some(*code),
                output: "error: could not compile".to_string(),
            });
        }

        let dir = self.out_dir.join(arch.rust_triple());
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let path = dir.join(&self.binary);
        fs::write(&path, format!("#!/bin/sh\necho {} {}\n", self.binary, arch.label()))
            .map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub repo: PathBuf,
    pub files: Vec<PathBuf>,
    pub message: String,
}

pub struct FakeSourceControl {
    /// Remote reported for every repository; `None` behaves like a repo without `origin`.
    pub remote: Mutex<Option<String>>,
    pub commits: Mutex<Vec<RecordedCommit>>,
    pub initialized: Mutex<Vec<PathBuf>>,
    pub fail_push: Mutex<bool>,
}

impl FakeSourceControl {
    pub fn new(remote: Option<&str>) -> Self {
        Self {
            remote: Mutex::new(remote.map(String::from)),
            commits: Mutex::new(Vec::new()),
            initialized: Mutex::new(Vec::new()),
            fail_push: Mutex::new(false),
        }
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn remote_url(&self, repo: &Path) -> Result<String, Error> {
        self.remote
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::CommandFailed {
                command: format!("git -C {} remote get-url origin", repo.display()),
                code: Some(2),
                stderr: "error: No such remote 'origin'".to_string(),
            })
    }

    async fn commit_and_push(&self, repo: &Path, files: &[PathBuf], message: &str) -> Result<(), Error> {
        if *self.fail_push.lock().unwrap() {
            return Err(Error::CommandFailed {
                command: "git push".to_string(),
                code: Some(1),
                stderr: "! [rejected] main -> main (fetch first)".to_string(),
            });
        }
        self.commits.lock().unwrap().push(RecordedCommit {
            repo: repo.to_path_buf(),
            files: files.to_vec(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn init_repository(&self, repo: &Path) -> Result<(), Error> {
        self.initialized.lock().unwrap().push(repo.to_path_buf());
        Ok(())
    }
}

/// Releases kept in memory, keyed by tag, in creation order.
pub struct FakeReleaseHost {
    /// GitHub `owner/repo` used to build download URLs.
    pub project: GitHubRemote,
    pub releases: Mutex<Vec<ReleaseRequest>>,
    pub repositories: Mutex<Vec<(PathBuf, String, bool)>>,
}

impl FakeReleaseHost {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            project: GitHubRemote {
                owner: owner.to_string(),
                repo: repo.to_string(),
            },
            releases: Mutex::new(Vec::new()),
            repositories: Mutex::new(Vec::new()),
        }
    }

    pub fn download_url(&self, version: &str, asset: &str) -> String {
        format!("{}/releases/download/{}/{}", self.project.https_url(), version, asset)
    }

    pub fn release(&self, version: &str) -> Option<ReleaseRequest> {
        self.releases
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.version == version)
            .cloned()
    }

    fn assets_of(&self, release: &ReleaseRequest) -> Vec<ReleaseAsset> {
        release
            .assets
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| {
                let name = name.to_string_lossy().to_string();
                ReleaseAsset {
                    url: self.download_url(&release.version, &name),
                    name,
                }
            })
            .collect()
    }
}

#[async_trait]
impl ReleaseHost for FakeReleaseHost {
    async fn previous_release_version(&self, _project_path: &Path) -> Result<Option<String>, Error> {
        Ok(self.releases.lock().unwrap().last().map(|r| r.version.clone()))
    }

    async fn create_release(&self, request: &ReleaseRequest) -> Result<(), Error> {
        let mut releases = self.releases.lock().unwrap();
        if releases.iter().any(|r| r.version == request.version) {
            return Err(Error::ReleaseConflict {
                version: request.version.clone(),
                message: "a release with the same tag name already exists".to_string(),
            });
        }
        releases.push(request.clone());
        Ok(())
    }

    async fn release_assets(&self, _project_path: &Path, version: &str) -> Result<Vec<ReleaseAsset>, Error> {
        Ok(self.release(version).map(|r| self.assets_of(&r)).unwrap_or_default())
    }

    async fn latest_release_asset_url(&self, _project_path: &Path) -> Result<Option<String>, Error> {
        let latest = self.releases.lock().unwrap().last().cloned();
        Ok(latest.and_then(|r| self.assets_of(&r).into_iter().next()).map(|a| a.url))
    }

    async fn create_repository(&self, repo: &Path, name: &str, private: bool) -> Result<(), Error> {
        self.repositories
            .lock()
            .unwrap()
            .push((repo.to_path_buf(), name.to_string(), private));
        Ok(())
    }
}

/// Writes the next scripted text on each open; leaves the file alone once the script runs out.
pub struct FakeEditor {
    pub script: Mutex<Vec<String>>,
    pub opened: Mutex<Vec<PathBuf>>,
}

impl FakeEditor {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: Mutex::new(script.iter().rev().map(|s| s.to_string()).collect()),
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextEditor for FakeEditor {
    async fn edit(&self, path: &Path) -> Result<(), Error> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        if let Some(text) = self.script.lock().unwrap().pop() {
            fs::write(path, text).map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }
}

// ============================================================================
// TestContext
// ============================================================================

/// Everything an integration test needs, rooted in a temporary directory.
pub struct TestContext {
    pub tmp: TempDir,
    pub paths: Paths,
    pub db: Database,
    pub build_tool: FakeBuildTool,
    pub source_control: FakeSourceControl,
    pub release_host: FakeReleaseHost,
    pub editor: FakeEditor,
}

impl TestContext {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path().join("root"));
        let build_tool = FakeBuildTool::new(tmp.path().join("target"), "mytool");

        Self {
            paths,
            db: Database::in_memory().unwrap(),
            build_tool,
            source_control: FakeSourceControl::new(Some("https://github.com/nikolai/homebrew-nntools")),
            release_host: FakeReleaseHost::new("nikolai", "mytool"),
            editor: FakeEditor::new(&[]),
            tmp,
        }
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Create `homebrew-<name>/Formula/<formula>.rb` files under the temp dir.
    pub fn write_tap(&self, name: &str, formulas: &[(&str, &str)]) -> PathBuf {
        let dir = self.path().join(format!("homebrew-{name}"));
        fs::create_dir_all(dir.join("Formula")).unwrap();
        for (formula, source) in formulas {
            fs::write(dir.join("Formula").join(format!("{formula}.rb")), source).unwrap();
        }
        dir
    }

    /// A minimal Cargo project directory for the build fakes to "compile".
    pub fn write_project(&self, name: &str) -> PathBuf {
        let dir = self.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("Cargo.toml"),
            format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )
        .unwrap();
        dir
    }

    pub fn tap_manager(&mut self) -> TapManager<'_> {
        TapManager::new(&mut self.db, &self.source_control, &self.release_host)
    }

    pub fn publisher(&mut self) -> ReleasePublisher<'_> {
        let tools = Collaborators {
            build_tool: &self.build_tool,
            source_control: &self.source_control,
            release_host: &self.release_host,
            editor: &self.editor,
        };
        ReleasePublisher::new(&mut self.db, tools, self.paths.notes_dir())
    }

    /// A single-arch binary publish of `install_name` at an explicit version.
    pub fn publish_request(&self, tap: &str, install_name: &str, version: &str) -> PublishRequest {
        let mut build = BuildConfig::new(self.paths.project_build_dir(install_name));
        build.targets = vec![Arch::Arm64];
        PublishRequest {
            project_path: self.path().join(install_name),
            tap: tap.to_string(),
            install_name: install_name.to_string(),
            version: ReleaseVersionInfo::from_arg(version),
            notes: NotesSource::Text(format!("Release {version}")),
            upload_type: None,
            build,
            details: FormulaDetails::default(),
            commit_message: None,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_release_host_rejects_duplicate_tags() {
        let host = FakeReleaseHost::new("nikolai", "mytool");
        let request = ReleaseRequest {
            project_path: PathBuf::from("/src/mytool"),
            version: "1.0.0".into(),
            assets: vec![PathBuf::from("/out/mytool-arm64")],
            notes: crate::traits::ReleaseNotes::Generate,
        };

        host.create_release(&request).await.unwrap();
        assert!(matches!(
            host.create_release(&request).await,
            Err(Error::ReleaseConflict { .. })
        ));

        let assets = host.release_assets(Path::new("/src/mytool"), "1.0.0").await.unwrap();
        assert_eq!(
            assets[0].url,
            "https://github.com/nikolai/mytool/releases/download/1.0.0/mytool-arm64"
        );
        assert_eq!(
            host.previous_release_version(Path::new("/src/mytool")).await.unwrap(),
            Some("1.0.0".into())
        );
    }

    #[tokio::test]
    async fn fake_editor_follows_script() {
        let ctx = TestContext::new();
        let file = ctx.path().join("notes.md");
        let editor = FakeEditor::new(&["first"]);

        editor.edit(&file).await.unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "first");
        editor.edit(&file).await.unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "first");
        assert_eq!(editor.opened.lock().unwrap().len(), 2);
    }
}
