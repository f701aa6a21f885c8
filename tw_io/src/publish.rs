//! The publish pipeline.
//!
//! One run walks six stages in order and stops at the first failure:
//!
//! 1. resolve the release version (using the previous release for bumps)
//! 2. build and archive the binaries
//! 3. compose release notes (one editor retry when empty)
//! 4. create the remote release and read back the asset URLs
//! 5. update the formula record in place, or create it
//! 6. write the formula document into the tap and commit/push it
//!
//! Nothing is rolled back. A failure in stage 6 leaves the release and the
//! stored formula from stages 4 and 5 in place; the document can be
//! regenerated by publishing again.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use tw_core::{
    ArchivedBinary, BuildConfig, Error, Formula, FormulaDocumentGenerator, FormulaPublishInfo,
    GitHubRemote, PublishStage, ReleaseVersionInfo, Tap, TestCommand, UploadType, resolve_version,
};

use crate::archive::ArchiveBuilder;
use crate::db::Database;
use crate::notes::{NotesSource, compose_notes};
use crate::progress::{ProgressCallback, PublishProgress};
use crate::traits::{BuildTool, ReleaseHost, ReleaseRequest, SourceControl, TextEditor};

/// External tools a publish drives, constructed once by the caller.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub build_tool: &'a dyn BuildTool,
    pub source_control: &'a dyn SourceControl,
    pub release_host: &'a dyn ReleaseHost,
    pub editor: &'a dyn TextEditor,
}

/// Formula metadata supplied on the command line. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaDetails {
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub test_command: Option<TestCommand>,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub project_path: PathBuf,
    pub tap: String,
    /// Formula name, also the installed binary name.
    pub install_name: String,
    pub version: ReleaseVersionInfo,
    pub notes: NotesSource,
    /// Upload type override; otherwise the stored formula's, else binary.
    pub upload_type: Option<UploadType>,
    /// Empty `extra_args` reuse the stored formula's build arguments.
    pub build: BuildConfig,
    pub details: FormulaDetails,
    /// Defaults to `Update <name> to <version>`.
    pub commit_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub version: String,
    pub artifacts: Vec<ArchivedBinary>,
    pub asset_urls: Vec<String>,
    pub formula: Formula,
    /// True when the formula record was created rather than updated.
    pub created: bool,
    pub formula_path: PathBuf,
}

pub struct ReleasePublisher<'a> {
    db: &'a mut Database,
    tools: Collaborators<'a>,
    notes_dir: PathBuf,
    progress: Option<Arc<ProgressCallback>>,
}

impl<'a> ReleasePublisher<'a> {
    pub fn new(db: &'a mut Database, tools: Collaborators<'a>, notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            tools,
            notes_dir: notes_dir.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: PublishProgress) {
        if let Some(cb) = &self.progress {
            cb(event);
        }
    }

    fn start(&self, stage: PublishStage) {
        info!(stage = stage.label(), "stage started");
        self.emit(PublishProgress::StageStarted { stage });
    }

    fn complete(&self, stage: PublishStage, detail: impl Into<String>) {
        self.emit(PublishProgress::StageCompleted {
            stage,
            detail: detail.into(),
        });
    }

    /// Tag a stage result's error with the stage and report it.
    fn check<T>(&self, stage: PublishStage, result: Result<T, Error>) -> Result<T, Error> {
        result.map_err(|e| {
            self.emit(PublishProgress::StageFailed {
                stage,
                message: e.to_string(),
            });
            e.at(stage)
        })
    }

    pub async fn publish(&mut self, request: PublishRequest) -> Result<PublishOutcome, Error> {
        if request.install_name.trim().is_empty() {
            return Err(Error::InvalidInput {
                message: "install name must not be empty".to_string(),
            });
        }

        // Fail before anything is built or released if the document could never be written.
        let tap = self.db.get_tap(&request.tap)?.ok_or_else(|| Error::MissingTap {
            name: request.tap.clone(),
        })?;
        if GitHubRemote::parse(&tap.remote_path).is_none() {
            return Err(Error::MissingGitHubUsername {
                remote: tap.remote_path.clone(),
            });
        }
        let existing = tap.formula(&request.install_name).cloned();

        let stage = PublishStage::ResolveVersion;
        self.start(stage);
        let version = self.check(stage, self.resolve(&request).await)?;
        self.complete(stage, version.clone());

        let stage = PublishStage::Build;
        self.start(stage);
        let build = effective_build_config(&request, existing.as_ref());
        let artifacts = self.check(
            stage,
            ArchiveBuilder::new(self.tools.build_tool)
                .build(&request.project_path, &build, Some(&version))
                .await,
        )?;
        for artifact in &artifacts {
            self.emit(PublishProgress::ArtifactReady {
                artifact: artifact.clone(),
            });
        }
        self.complete(stage, format!("{} artifact(s)", artifacts.len()));

        let stage = PublishStage::ComposeReleaseNotes;
        self.start(stage);
        let draft = self
            .notes_dir
            .join(format!("{}-{}.md", request.install_name, version));
        let notes = self.check(
            stage,
            compose_notes(&request.notes, self.tools.editor, &draft).await,
        )?;
        self.complete(stage, "");

        let stage = PublishStage::CreateRemoteRelease;
        self.start(stage);
        let release = ReleaseRequest {
            project_path: request.project_path.clone(),
            version: version.clone(),
            assets: artifacts.iter().map(|a| a.path.clone()).collect(),
            notes,
        };
        let asset_urls = self.check(stage, self.create_release(&release, &artifacts).await)?;
        self.complete(stage, version.clone());

        let stage = PublishStage::UpdateOrCreateFormula;
        self.start(stage);
        let formula = self.desired_formula(&request, &build, existing.as_ref(), &tap).await;
        let created = existing.is_none();
        let result = self.store_formula(&formula, existing.as_ref(), &tap);
        self.check(stage, result)?;
        self.complete(stage, if created { "created" } else { "updated" });

        let stage = PublishStage::WriteAndCommitFormulaDocument;
        self.start(stage);
        let info = FormulaPublishInfo {
            version: version.clone(),
            install_name: request.install_name.clone(),
            asset_urls: asset_urls.clone(),
            binaries: artifacts.clone(),
        };
        let message = request
            .commit_message
            .clone()
            .unwrap_or_else(|| format!("Update {} to {}", request.install_name, version));
        let written = self.write_document(&formula, &tap, &info, &message).await;
        if let Err(e) = &written {
            warn!(
                error = %e,
                version = %version,
                "release and formula record are published; the formula document was not"
            );
        }
        let formula_path = self.check(stage, written)?;
        self.complete(stage, formula_path.display().to_string());

        Ok(PublishOutcome {
            version,
            artifacts,
            asset_urls,
            formula,
            created,
            formula_path,
        })
    }

    async fn resolve(&self, request: &PublishRequest) -> Result<String, Error> {
        let previous = if request.version.needs_previous_version() {
            self.tools
                .release_host
                .previous_release_version(&request.project_path)
                .await?
        } else {
            None
        };
        resolve_version(&request.version, previous.as_deref())
    }

    /// Create the release, then return asset URLs in artifact order.
    async fn create_release(
        &self,
        release: &ReleaseRequest,
        artifacts: &[ArchivedBinary],
    ) -> Result<Vec<String>, Error> {
        let host = self.tools.release_host;
        host.create_release(release).await?;

        let assets = host
            .release_assets(&release.project_path, &release.version)
            .await?;

        let mut urls = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let name = artifact.file_name();
            match assets.iter().find(|a| a.name == name) {
                Some(asset) => urls.push(asset.url.clone()),
                None if artifacts.len() == 1 => {
                    let url = host
                        .latest_release_asset_url(&release.project_path)
                        .await?
                        .ok_or_else(|| Error::InvalidInput {
                            message: format!("release {} has no asset '{}'", release.version, name),
                        })?;
                    urls.push(url);
                }
                None => {
                    return Err(Error::InvalidInput {
                        message: format!("release {} has no asset '{}'", release.version, name),
                    });
                }
            }
        }

        Ok(urls)
    }

    async fn desired_formula(
        &self,
        request: &PublishRequest,
        build: &BuildConfig,
        existing: Option<&Formula>,
        tap: &Tap,
    ) -> Formula {
        let mut formula = match existing {
            Some(f) => f.clone(),
            None => {
                let mut f = Formula::new(&request.install_name);
                f.test_command = Some(TestCommand::DefaultCommand);
                f
            }
        };

        let details = &request.details;
        if let Some(description) = &details.description {
            formula.details = description.clone();
        }
        if let Some(license) = &details.license {
            formula.license = license.clone();
        }
        if let Some(test_command) = &details.test_command {
            formula.test_command = Some(test_command.clone());
        }
        match &details.homepage {
            Some(homepage) => formula.homepage = homepage.clone(),
            None if formula.homepage.is_empty() => {
                formula.homepage = self.project_homepage(&request.project_path).await;
            }
            None => {}
        }

        formula.local_project_path = request.project_path.clone();
        formula.upload_type = build.upload_type;
        formula.extra_build_args = build.extra_args.clone();
        formula.tap = Some(tap.name.clone());
        formula
    }

    /// The project's GitHub page, if its remote points at GitHub.
    async fn project_homepage(&self, project_path: &Path) -> String {
        match self.tools.source_control.remote_url(project_path).await {
            Ok(url) => GitHubRemote::parse(&url)
                .map(|remote| remote.https_url())
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not read project remote for homepage");
                String::new()
            }
        }
    }

    fn store_formula(&mut self, formula: &Formula, existing: Option<&Formula>, tap: &Tap) -> Result<(), Error> {
        match existing {
            Some(current) => {
                let mut updated = current.clone();
                updated.apply_update(formula);
                if !self.db.update_formula(&updated)? {
                    return Err(Error::MissingFormula {
                        name: formula.name.clone(),
                    });
                }
                info!(formula = %formula.name, tap = %tap.name, "updated formula record");
            }
            None => {
                self.db.save_new_formula(formula, &tap.name)?;
                info!(formula = %formula.name, tap = %tap.name, "created formula record");
            }
        }
        Ok(())
    }

    async fn write_document(
        &self,
        formula: &Formula,
        tap: &Tap,
        info: &FormulaPublishInfo,
        message: &str,
    ) -> Result<PathBuf, Error> {
        let document = FormulaDocumentGenerator::render(formula, Some(tap), info)?;
        let path = tap.formula_file(&info.install_name);
        write_atomic(&path, document.as_bytes())?;

        self.tools
            .source_control
            .commit_and_push(&tap.local_path, std::slice::from_ref(&path), message)
            .await?;
        Ok(path)
    }
}

/// The stored formula's settings fill in whatever the request leaves open.
fn effective_build_config(request: &PublishRequest, existing: Option<&Formula>) -> BuildConfig {
    let mut build = request.build.clone();
    build.upload_type = request
        .upload_type
        .or(existing.map(|f| f.upload_type))
        .unwrap_or_default();
    if build.extra_args.is_empty()
        && let Some(formula) = existing
    {
        build.extra_args = formula.extra_build_args.clone();
    }
    // Tarball entries are installed as-is, so they carry the install name.
    if build.binary_name.is_none() || build.upload_type == UploadType::Tarball {
        build.binary_name = Some(request.install_name.clone());
    }
    build
}

/// Replace `path` with `data` via a temporary file in the same directory.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(data).map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
