//! Build targets and the artifacts a publish produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::Error;
use crate::formula::UploadType;

/// CPU architecture a binary is built for (macOS targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm64,
    X86_64,
}

impl Arch {
    /// Architecture of the machine running the build.
    pub fn host() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Arch::Arm64
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            Arch::X86_64
        }
    }

    pub fn rust_triple(&self) -> &'static str {
        match self {
            Arch::Arm64 => "aarch64-apple-darwin",
            Arch::X86_64 => "x86_64-apple-darwin",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Homebrew hardware block selecting this architecture.
    pub fn homebrew_block(&self) -> &'static str {
        match self {
            Arch::Arm64 => "on_arm",
            Arch::X86_64 => "on_intel",
        }
    }

    pub fn all() -> &'static [Arch] {
        &[Arch::Arm64, Arch::X86_64]
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arm64" | "aarch64" | "arm" => Ok(Arch::Arm64),
            "x86_64" | "x86-64" | "amd64" | "intel" => Ok(Arch::X86_64),
            other => Err(Error::InvalidInput {
                message: format!("unknown architecture '{}': expected arm64 or x86_64", other),
            }),
        }
    }
}

/// What the archive builder should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Deduplicated, sorted; empty means the host architecture.
    pub targets: Vec<Arch>,
    pub upload_type: UploadType,
    pub extra_args: Vec<String>,
    /// Clear the output directory before building.
    pub clean: bool,
    pub output_dir: PathBuf,
    /// Binary name override; defaults to the project's package name.
    pub binary_name: Option<String>,
}

impl BuildConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        BuildConfig {
            targets: Vec::new(),
            upload_type: UploadType::Binary,
            extra_args: Vec::new(),
            clean: false,
            output_dir: output_dir.into(),
            binary_name: None,
        }
    }

    pub fn universal(mut self) -> Self {
        self.targets = Arch::all().to_vec();
        self
    }

    pub fn resolved_targets(&self) -> Vec<Arch> {
        if self.targets.is_empty() {
            return vec![Arch::host()];
        }
        let mut targets = self.targets.clone();
        targets.sort();
        targets.dedup();
        targets
    }
}

/// One built, checksummed artifact ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedBinary {
    /// Architectures contained; one for raw binaries, possibly several in a tarball.
    pub archs: Vec<Arch>,
    pub path: PathBuf,
    /// SHA-256 over the exact uploaded bytes.
    pub sha256: Option<String>,
    pub size: u64,
}

impl ArchivedBinary {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn label(&self) -> String {
        self.archs
            .iter()
            .map(|a| a.label())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Everything a formula document needs about one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaPublishInfo {
    pub version: String,
    pub install_name: String,
    /// Download URLs, in the same order as `binaries`.
    pub asset_urls: Vec<String>,
    pub binaries: Vec<ArchivedBinary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arch_aliases() {
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert_eq!("Intel".parse::<Arch>().unwrap(), Arch::X86_64);
        assert!("riscv".parse::<Arch>().is_err());
    }

    #[test]
    fn empty_targets_resolve_to_host() {
        let config = BuildConfig::new("/tmp/out");
        assert_eq!(config.resolved_targets(), vec![Arch::host()]);
    }

    #[test]
    fn targets_are_sorted_and_deduplicated() {
        let mut config = BuildConfig::new("/tmp/out");
        config.targets = vec![Arch::X86_64, Arch::Arm64, Arch::X86_64];
        assert_eq!(config.resolved_targets(), vec![Arch::Arm64, Arch::X86_64]);
        assert_eq!(BuildConfig::new("/tmp").universal().resolved_targets().len(), 2);
    }

    #[test]
    fn archived_binary_labels() {
        let artifact = ArchivedBinary {
            archs: vec![Arch::Arm64, Arch::X86_64],
            path: PathBuf::from("/tmp/out/mytool-1.0.0.tar.gz"),
            sha256: None,
            size: 10,
        };
        assert_eq!(artifact.file_name(), "mytool-1.0.0.tar.gz");
        assert_eq!(artifact.label(), "arm64+x86_64");
    }
}
