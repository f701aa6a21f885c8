//! Tap management: importing existing tap working copies, creating new
//! taps, and removing taps or formulas.
//!
//! A tap is a git working copy named `homebrew-<name>`:
//! - `Formula/<formula>.rb` - formula documents
//! - `README.md` - install instructions
//!
//! The store keeps the tap record and its formulas; the working copy is the
//! published form.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use tw_core::{Error, Formula, Tap, parse_ruby_formula};

use crate::db::Database;
use crate::traits::{ReleaseHost, SourceControl};

const TAP_PREFIX: &str = "homebrew-";

/// Tap name for a working copy directory: the directory name without `homebrew-`.
pub fn tap_name_for_dir(path: &Path) -> Option<String> {
    let dir = path.file_name()?.to_string_lossy();
    let name = dir.strip_prefix(TAP_PREFIX).unwrap_or(&dir);
    (!name.is_empty()).then(|| name.to_string())
}

/// Outcome of importing a tap.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub tap: Tap,
    /// Formula files that could not be decoded, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// `.rb` files directly inside `dir`, sorted by name.
fn ruby_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "rb"))
        .collect()
}

/// Locate formula files: `Formula/*.rb`, else `*.rb` at the tap root.
pub fn formula_files(tap_dir: &Path) -> Vec<PathBuf> {
    let nested = ruby_files(&tap_dir.join("Formula"));
    if nested.is_empty() {
        ruby_files(tap_dir)
    } else {
        nested
    }
}

pub struct TapManager<'a> {
    db: &'a mut Database,
    source_control: &'a dyn SourceControl,
    release_host: &'a dyn ReleaseHost,
}

impl<'a> TapManager<'a> {
    pub fn new(
        db: &'a mut Database,
        source_control: &'a dyn SourceControl,
        release_host: &'a dyn ReleaseHost,
    ) -> Self {
        Self {
            db,
            source_control,
            release_host,
        }
    }

    pub fn list_taps(&self) -> Result<Vec<Tap>, Error> {
        self.db.load_taps()
    }

    /// Register an existing tap working copy and the formulas it contains.
    pub async fn import_tap(&mut self, path: &Path) -> Result<ImportReport, Error> {
        let local_path = std::path::absolute(path).map_err(|e| Error::io(path, e))?;
        if !local_path.is_dir() {
            return Err(Error::InvalidInput {
                message: format!("{} is not a directory", local_path.display()),
            });
        }
        let name = tap_name_for_dir(&local_path).ok_or_else(|| Error::InvalidInput {
            message: format!("cannot derive a tap name from {}", local_path.display()),
        })?;

        let remote = match self.source_control.remote_url(&local_path).await {
            Ok(url) => url,
            Err(e @ Error::ToolUnavailable { .. }) => return Err(e),
            Err(e) => {
                warn!(tap = %name, error = %e, "tap has no readable remote");
                String::new()
            }
        };

        let mut formulas: Vec<Formula> = Vec::new();
        let mut skipped = Vec::new();
        for file in formula_files(&local_path) {
            let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let source = fs::read_to_string(&file).map_err(|e| Error::io(&file, e))?;
            match parse_ruby_formula(&source, &stem) {
                Ok(decoded) => {
                    let mut formula = decoded.formula;
                    formula.tap = Some(name.clone());
                    formulas.push(formula);
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping undecodable formula");
                    skipped.push((file, e.to_string()));
                }
            }
        }

        let tap = Tap {
            formulas: formulas.clone(),
            ..Tap::new(&name, &local_path, remote)
        };
        self.db.save_new_tap(&tap, &formulas)?;
        info!(tap = %name, formulas = formulas.len(), "imported tap");

        Ok(ImportReport { tap, skipped })
    }

    /// Create `<parent>/homebrew-<name>`, publish it as a new remote
    /// repository and register it.
    pub async fn create_tap(&mut self, name: &str, parent: &Path, private: bool) -> Result<Tap, Error> {
        let name = name.strip_prefix(TAP_PREFIX).unwrap_or(name);
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(Error::InvalidInput {
                message: format!("invalid tap name '{}'", name),
            });
        }
        if self.db.get_tap(name)?.is_some() {
            return Err(Error::DuplicateTap {
                field: "name",
                value: name.to_string(),
            });
        }

        let repo_name = format!("{TAP_PREFIX}{name}");
        let parent = std::path::absolute(parent).map_err(|e| Error::io(parent, e))?;
        let dir = parent.join(&repo_name);
        if dir.exists() {
            return Err(Error::InvalidInput {
                message: format!(
                    "{} already exists; use 'tw brew import-tap' to register it",
                    dir.display()
                ),
            });
        }

        let formula_dir = dir.join("Formula");
        fs::create_dir_all(&formula_dir).map_err(|e| Error::io(&formula_dir, e))?;
        let keep = formula_dir.join(".gitkeep");
        fs::write(&keep, "").map_err(|e| Error::io(&keep, e))?;
        let readme = dir.join("README.md");
        fs::write(&readme, format!("# {repo_name}\n\nHomebrew formulas.\n"))
            .map_err(|e| Error::io(&readme, e))?;

        self.source_control.init_repository(&dir).await?;
        self.release_host
            .create_repository(&dir, &repo_name, private)
            .await?;
        let remote = self.source_control.remote_url(&dir).await?;

        let tap = Tap::new(name, &dir, remote);
        self.db.save_new_tap(&tap, &[])?;
        info!(tap = %name, path = %dir.display(), "created tap");

        Ok(tap)
    }

    /// Forget a tap and its formulas. The working copy stays on disk.
    pub fn remove_tap(&mut self, name: &str) -> Result<Tap, Error> {
        let tap = self.db.get_tap(name)?.ok_or_else(|| Error::MissingTap {
            name: name.to_string(),
        })?;
        self.db.delete_tap(name)?;
        info!(tap = %name, formulas = tap.formulas.len(), "removed tap");
        Ok(tap)
    }

    /// Delete a formula record and its document from the working copy.
    pub fn remove_formula(&mut self, tap_name: &str, formula: &str) -> Result<(), Error> {
        let tap = self.db.get_tap(tap_name)?.ok_or_else(|| Error::MissingTap {
            name: tap_name.to_string(),
        })?;
        if !self.db.delete_formula(tap_name, formula)? {
            return Err(Error::MissingFormula {
                name: formula.to_string(),
            });
        }

        for file in [
            tap.formula_file(formula),
            tap.local_path.join(format!("{formula}.rb")),
        ] {
            if file.exists() {
                fs::remove_file(&file).map_err(|e| Error::io(&file, e))?;
            }
        }
        info!(tap = %tap_name, formula, "removed formula");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockReleaseHost, MockSourceControl};
    use tempfile::TempDir;
    use tw_core::{TestCommand, UploadType};

    const MYTOOL_RB: &str = r##"class Mytool < Formula
  desc "Does things"
  homepage "https://github.com/nikolai/mytool"
  version "1.0.0"
  license "MIT"
  url "https://github.com/nikolai/mytool/releases/download/1.0.0/mytool-arm64"
  sha256 "abc"

  def install
    bin.install "mytool-arm64" => "mytool"
  end

  test do
    system "#{bin}/mytool", "--version"
  end
end
"##;

    fn remote(url: &'static str) -> MockSourceControl {
        let mut sc = MockSourceControl::new();
        sc.expect_remote_url().returning(move |_| Ok(url.to_string()));
        sc
    }

    #[test]
    fn tap_name_strips_prefix() {
        assert_eq!(tap_name_for_dir(Path::new("/tmp/homebrew-nntools")).as_deref(), Some("nntools"));
        assert_eq!(tap_name_for_dir(Path::new("/tmp/tools")).as_deref(), Some("tools"));
        assert_eq!(tap_name_for_dir(Path::new("/tmp/homebrew-")), None);
    }

    #[tokio::test]
    async fn import_decodes_formulas_and_skips_broken_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("homebrew-nntools");
        fs::create_dir_all(dir.join("Formula")).unwrap();
        fs::write(dir.join("Formula/mytool.rb"), MYTOOL_RB).unwrap();
        fs::write(dir.join("Formula/broken.rb"), "module Nope; end").unwrap();
        fs::write(dir.join("Formula/notes.txt"), "ignored").unwrap();

        let mut db = Database::in_memory().unwrap();
        let sc = remote("https://github.com/nikolai/homebrew-nntools");
        let host = MockReleaseHost::new();

        let report = TapManager::new(&mut db, &sc, &host)
            .import_tap(&dir)
            .await
            .unwrap();

        assert_eq!(report.tap.name, "nntools");
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("broken.rb"));

        let taps = db.load_taps().unwrap();
        assert_eq!(taps.len(), 1);
        assert_eq!(taps[0].remote_path, "https://github.com/nikolai/homebrew-nntools");
        let mytool = taps[0].formula("mytool").unwrap();
        assert_eq!(mytool.details, "Does things");
        assert_eq!(mytool.upload_type, UploadType::Binary);
        assert_eq!(mytool.test_command, Some(TestCommand::DefaultCommand));
    }

    #[tokio::test]
    async fn import_falls_back_to_root_formulas() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("homebrew-flat");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mytool.rb"), MYTOOL_RB).unwrap();

        let mut db = Database::in_memory().unwrap();
        let mut sc = MockSourceControl::new();
        sc.expect_remote_url().returning(|_| {
            Err(Error::CommandFailed {
                command: "git remote get-url origin".into(),
                code: Some(2),
                stderr: "error: No such remote 'origin'".into(),
            })
        });
        let host = MockReleaseHost::new();

        let report = TapManager::new(&mut db, &sc, &host)
            .import_tap(&dir)
            .await
            .unwrap();
        assert_eq!(report.tap.formulas.len(), 1);
        assert_eq!(report.tap.remote_path, "");
    }

    #[tokio::test]
    async fn importing_twice_is_a_duplicate() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("homebrew-nntools");
        fs::create_dir_all(&dir).unwrap();

        let mut db = Database::in_memory().unwrap();
        let sc = remote("https://github.com/nikolai/homebrew-nntools");
        let host = MockReleaseHost::new();
        let mut manager = TapManager::new(&mut db, &sc, &host);

        manager.import_tap(&dir).await.unwrap();
        let err = manager.import_tap(&dir).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTap { field: "name", .. }));
    }

    #[tokio::test]
    async fn create_tap_scaffolds_and_registers() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::in_memory().unwrap();

        let mut sc = MockSourceControl::new();
        sc.expect_init_repository().times(1).returning(|_| Ok(()));
        sc.expect_remote_url()
            .returning(|_| Ok("https://github.com/nikolai/homebrew-nntools".into()));
        let mut host = MockReleaseHost::new();
        host.expect_create_repository()
            .withf(|_, name, private| name == "homebrew-nntools" && !*private)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let tap = TapManager::new(&mut db, &sc, &host)
            .create_tap("nntools", tmp.path(), false)
            .await
            .unwrap();

        let dir = tmp.path().join("homebrew-nntools");
        assert_eq!(tap.local_path, dir);
        assert!(dir.join("Formula").is_dir());
        assert!(dir.join("README.md").is_file());
        assert!(db.get_tap("nntools").unwrap().is_some());
    }

    #[tokio::test]
    async fn create_tap_refuses_existing_name_before_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::in_memory().unwrap();
        db.save_new_tap(&Tap::new("nntools", "/elsewhere", ""), &[])
            .unwrap();

        let sc = MockSourceControl::new();
        let host = MockReleaseHost::new();
        let err = TapManager::new(&mut db, &sc, &host)
            .create_tap("homebrew-nntools", tmp.path(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateTap { .. }));
        assert!(!tmp.path().join("homebrew-nntools").exists());
    }

    #[tokio::test]
    async fn remove_formula_deletes_record_and_document() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("homebrew-nntools");
        fs::create_dir_all(dir.join("Formula")).unwrap();
        fs::write(dir.join("Formula/mytool.rb"), MYTOOL_RB).unwrap();

        let mut db = Database::in_memory().unwrap();
        let sc = remote("https://github.com/nikolai/homebrew-nntools");
        let host = MockReleaseHost::new();
        let mut manager = TapManager::new(&mut db, &sc, &host);
        manager.import_tap(&dir).await.unwrap();

        manager.remove_formula("nntools", "mytool").unwrap();
        assert!(!dir.join("Formula/mytool.rb").exists());
        assert!(matches!(
            manager.remove_formula("nntools", "mytool"),
            Err(Error::MissingFormula { .. })
        ));

        let removed = manager.remove_tap("nntools").unwrap();
        assert_eq!(removed.name, "nntools");
        assert!(dir.exists());
        assert!(manager.list_taps().unwrap().is_empty());
    }
}
