//! Turning built binaries into checksummed release artifacts.
//!
//! Binary uploads produce one file per architecture named
//! `<name>-<arch>`. Tarball uploads produce a single `.tar.gz`; when it holds
//! several architectures each binary sits in a directory named after its
//! architecture. Checksums are always taken over the exact bytes that get
//! uploaded.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use tw_core::{Arch, ArchivedBinary, BuildConfig, Error, UploadType};

use crate::traits::BuildTool;

/// SHA-256 of a file, as lowercase hex.
pub fn compute_sha256(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| Error::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn file_size(path: &Path) -> Result<u64, Error> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| Error::io(path, e))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

/// Write a gzip'd tarball of `entries` (archive path, source file).
///
/// Headers are normalized (mtime 0, root-owned, mode 0755) so rebuilding the
/// same binaries yields the same checksum.
pub fn write_tarball(dest: &Path, entries: &[(String, PathBuf)]) -> Result<(), Error> {
    let out = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, source) in entries {
        let mut file = File::open(source).map_err(|e| Error::io(source, e))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(file_size(source)?);
        header.set_mode(0o755);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, name, &mut file)
            .map_err(|e| Error::io(dest, e))?;
    }

    let encoder = builder.into_inner().map_err(|e| Error::io(dest, e))?;
    encoder.finish().map_err(|e| Error::io(dest, e))?;
    Ok(())
}

/// Copy artifacts into `dir`, returning the new paths.
pub fn copy_artifacts(artifacts: &[ArchivedBinary], dir: &Path) -> Result<Vec<PathBuf>, Error> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    artifacts
        .iter()
        .map(|artifact| {
            let dest = dir.join(artifact.file_name());
            fs::copy(&artifact.path, &dest).map_err(|e| Error::io(&dest, e))?;
            Ok(dest)
        })
        .collect()
}

/// Builds a project for each configured architecture and packages the results.
pub struct ArchiveBuilder<'a> {
    build_tool: &'a dyn BuildTool,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(build_tool: &'a dyn BuildTool) -> Self {
        Self { build_tool }
    }

    /// Build and archive. `version` names tarballs; binaries are unversioned.
    pub async fn build(
        &self,
        project_path: &Path,
        config: &BuildConfig,
        version: Option<&str>,
    ) -> Result<Vec<ArchivedBinary>, Error> {
        let output_dir = &config.output_dir;
        if config.clean && output_dir.exists() {
            info!(dir = %output_dir.display(), "cleaning build output");
            fs::remove_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;
        }
        fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

        let mut built: Vec<(Arch, PathBuf)> = Vec::new();
        for arch in config.resolved_targets() {
            let path = self
                .build_tool
                .build(project_path, arch, &config.extra_args)
                .await?;
            debug!(arch = arch.label(), path = %path.display(), "built binary");
            built.push((arch, path));
        }

        let name = match &config.binary_name {
            Some(name) => name.clone(),
            None => built
                .first()
                .and_then(|(_, p)| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::InvalidInput {
                    message: "build produced no binary".to_string(),
                })?,
        };

        let artifacts = match config.upload_type {
            UploadType::Binary => self.package_binaries(&name, &built, output_dir)?,
            UploadType::Tarball => vec![self.package_tarball(&name, &built, output_dir, version)?],
        };

        for artifact in &artifacts {
            info!(
                artifact = %artifact.file_name(),
                sha256 = artifact.sha256.as_deref().unwrap_or(""),
                size = artifact.size,
                "archived"
            );
        }

        Ok(artifacts)
    }

    fn package_binaries(
        &self,
        name: &str,
        built: &[(Arch, PathBuf)],
        output_dir: &Path,
    ) -> Result<Vec<ArchivedBinary>, Error> {
        built
            .iter()
            .map(|(arch, source)| {
                let dest = output_dir.join(format!("{}-{}", name, arch.label()));
                fs::copy(source, &dest).map_err(|e| Error::io(&dest, e))?;
                make_executable(&dest)?;
                Ok(ArchivedBinary {
                    archs: vec![*arch],
                    sha256: Some(compute_sha256(&dest)?),
                    size: file_size(&dest)?,
                    path: dest,
                })
            })
            .collect()
    }

    fn package_tarball(
        &self,
        name: &str,
        built: &[(Arch, PathBuf)],
        output_dir: &Path,
        version: Option<&str>,
    ) -> Result<ArchivedBinary, Error> {
        let file_name = match version {
            Some(version) => format!("{name}-{version}.tar.gz"),
            None => format!("{name}.tar.gz"),
        };
        let dest = output_dir.join(file_name);

        let entries: Vec<(String, PathBuf)> = if built.len() == 1 {
            vec![(name.to_string(), built[0].1.clone())]
        } else {
            built
                .iter()
                .map(|(arch, path)| (format!("{}/{}", arch.label(), name), path.clone()))
                .collect()
        };
        write_tarball(&dest, &entries)?;

        Ok(ArchivedBinary {
            archs: built.iter().map(|(arch, _)| *arch).collect(),
            sha256: Some(compute_sha256(&dest)?),
            size: file_size(&dest)?,
            path: dest,
        })
    }
}
