//! Build collaborator backed by `cargo build --release`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use tw_core::{Arch, Error};

use crate::process::run_command;
use crate::traits::BuildTool;

/// Read `[package] name` from a project's `Cargo.toml`.
pub fn package_name(project_path: &Path) -> Result<String, Error> {
    let manifest = project_path.join("Cargo.toml");
    let text = std::fs::read_to_string(&manifest).map_err(|e| Error::io(&manifest, e))?;
    let value: toml::Value = toml::from_str(&text).map_err(|e| Error::InvalidInput {
        message: format!("failed to parse {}: {}", manifest.display(), e),
    })?;

    value
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidInput {
            message: format!("{} has no [package] name", manifest.display()),
        })
}

pub struct CargoBuilder {
    /// Binary to pick out of the target directory; the package name when unset.
    binary_name: Option<String>,
}

impl CargoBuilder {
    pub fn new(binary_name: Option<String>) -> Self {
        Self { binary_name }
    }

    fn target_dir(project_path: &Path) -> PathBuf {
        std::env::var_os("CARGO_TARGET_DIR")
            .map(PathBuf::from)
            .map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    project_path.join(dir)
                }
            })
            .unwrap_or_else(|| project_path.join("target"))
    }
}

#[async_trait]
impl BuildTool for CargoBuilder {
    async fn build(
        &self,
        project_path: &Path,
        arch: Arch,
        extra_args: &[String],
    ) -> Result<PathBuf, Error> {
        let binary = match &self.binary_name {
            Some(name) => name.clone(),
            None => package_name(project_path)?,
        };

        info!(project = %project_path.display(), target = arch.rust_triple(), "building");

        let mut args = vec!["build", "--release", "--target", arch.rust_triple()];
        args.extend(extra_args.iter().map(String::as_str));

        run_command("cargo", &args, Some(project_path))
            .await
            .map_err(|e| match e {
                Error::CommandFailed { code, stderr, .. } => Error::BuildFailed {
                    target: arch.rust_triple().to_string(),
                    code,
                    output: stderr,
                },
                other => other,
            })?;

        let path = Self::target_dir(project_path)
            .join(arch.rust_triple())
            .join("release")
            .join(&binary);

        if !path.is_file() {
            return Err(Error::BuildFailed {
                target: arch.rust_triple().to_string(),
                code: None,
                output: format!("expected binary not found at {}", path.display()),
            });
        }

        Ok(path)
    }
}
