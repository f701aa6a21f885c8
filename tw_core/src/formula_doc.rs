//! Homebrew formula document rendering.
//!
//! Produces the Ruby definition file for a formula from its metadata and the
//! artifacts of one release:
//!
//! ```ruby
//! class Mytool < Formula
//!   desc "Does things"
//!   homepage "https://github.com/nikolai/mytool"
//!   version "1.0.1"
//!   license "MIT"
//!
//!   url "https://github.com/nikolai/mytool/releases/download/1.0.1/mytool-arm64"
//!   sha256 "..."
//!
//!   def install
//!     bin.install "mytool-arm64" => "mytool"
//!   end
//!
//!   test do
//!     system "#{bin}/mytool", "--version"
//!   end
//! end
//! ```
//!
//! Raw binaries built for several architectures get one `on_arm`/`on_intel`
//! block each, with their own `def install`. Tarballs always get a single
//! top-level `url`/`sha256` stanza. Output depends only on the inputs, so
//! re-rendering an unchanged release yields identical bytes.

use std::fmt::Write;

use crate::artifact::{Arch, ArchivedBinary, FormulaPublishInfo};
use crate::errors::Error;
use crate::formula::{Formula, GitHubRemote, Tap, TestCommand, UploadType};

/// Renders formula definition files.
pub struct FormulaDocumentGenerator;

impl FormulaDocumentGenerator {
    pub fn render(formula: &Formula, tap: Option<&Tap>, info: &FormulaPublishInfo) -> Result<String, Error> {
        let tap = tap.ok_or_else(|| Error::MissingTap {
            name: formula.tap.clone().unwrap_or_default(),
        })?;
        let owner = GitHubRemote::parse(&tap.remote_path)
            .map(|remote| remote.owner)
            .ok_or_else(|| Error::MissingGitHubUsername {
                remote: tap.remote_path.clone(),
            })?;

        if info.binaries.is_empty() {
            return Err(Error::InvalidInput {
                message: format!("no artifacts to publish for '{}'", info.install_name),
            });
        }
        if info.asset_urls.len() != info.binaries.len() {
            return Err(Error::InvalidInput {
                message: format!(
                    "{} asset URLs for {} artifacts",
                    info.asset_urls.len(),
                    info.binaries.len()
                ),
            });
        }
        let checksums = info
            .binaries
            .iter()
            .map(|artifact| match artifact.sha256.as_deref() {
                Some(sha) if !sha.is_empty() => Ok(sha),
                _ => Err(Error::MissingSha256 {
                    artifact: artifact.file_name(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let name = &info.install_name;
        let mut doc = String::new();
        let _ = writeln!(doc, "# typed: false");
        let _ = writeln!(doc, "# frozen_string_literal: true");
        let _ = writeln!(doc);
        let _ = writeln!(
            doc,
            "# brew install {}/{}/{}",
            owner,
            tap.short_name(),
            name
        );
        let _ = writeln!(doc, "class {} < Formula", formula.class_name());
        if !formula.details.is_empty() {
            let _ = writeln!(doc, "  desc \"{}\"", escape_literal(&formula.details));
        }
        if !formula.homepage.is_empty() {
            let _ = writeln!(doc, "  homepage \"{}\"", escape_literal(&formula.homepage));
        }
        let _ = writeln!(doc, "  version \"{}\"", escape_literal(&info.version));
        if !formula.license.is_empty() {
            let _ = writeln!(doc, "  license \"{}\"", escape_literal(&formula.license));
        }

        match formula.upload_type {
            UploadType::Tarball => {
                if info.binaries.len() > 1 {
                    return Err(Error::InvalidInput {
                        message: "tarball uploads carry exactly one archive".to_string(),
                    });
                }
                let artifact = &info.binaries[0];
                let _ = writeln!(doc);
                write_source(&mut doc, "  ", &info.asset_urls[0], checksums[0]);
                let _ = writeln!(doc);
                write_tarball_install(&mut doc, artifact, name);
            }
            UploadType::Binary if info.binaries.len() == 1 => {
                let artifact = &info.binaries[0];
                let _ = writeln!(doc);
                write_source(&mut doc, "  ", &info.asset_urls[0], checksums[0]);
                let _ = writeln!(doc);
                write_binary_install(&mut doc, "  ", artifact, name);
            }
            UploadType::Binary => {
                for ((artifact, url), sha) in info
                    .binaries
                    .iter()
                    .zip(&info.asset_urls)
                    .zip(&checksums)
                {
                    let Some(arch) = artifact.archs.first() else {
                        return Err(Error::InvalidInput {
                            message: format!("artifact '{}' has no architecture", artifact.file_name()),
                        });
                    };
                    let _ = writeln!(doc);
                    let _ = writeln!(doc, "  {} do", arch.homebrew_block());
                    write_source(&mut doc, "    ", url, sha);
                    let _ = writeln!(doc);
                    write_binary_install(&mut doc, "    ", artifact, name);
                    let _ = writeln!(doc, "  end");
                }
            }
        }

        if let Some(test) = &formula.test_command {
            let _ = writeln!(doc);
            let _ = writeln!(doc, "  test do");
            match test {
                TestCommand::DefaultCommand => {
                    let _ = writeln!(
                        doc,
                        "    system \"#{{bin}}/{}\", \"--version\"",
                        escape_literal(name)
                    );
                }
                TestCommand::Custom(command) => {
                    let _ = writeln!(doc, "    system \"{}\"", escape_command(command));
                }
            }
            let _ = writeln!(doc, "  end");
        }

        let _ = writeln!(doc, "end");
        Ok(doc)
    }
}

fn write_source(doc: &mut String, indent: &str, url: &str, sha256: &str) {
    let _ = writeln!(doc, "{indent}url \"{}\"", escape_literal(url));
    let _ = writeln!(doc, "{indent}sha256 \"{}\"", sha256);
}

fn write_binary_install(doc: &mut String, indent: &str, artifact: &ArchivedBinary, name: &str) {
    let _ = writeln!(doc, "{indent}def install");
    let _ = writeln!(
        doc,
        "{indent}  bin.install \"{}\" => \"{}\"",
        escape_literal(&artifact.file_name()),
        escape_literal(name)
    );
    let _ = writeln!(doc, "{indent}end");
}

fn write_tarball_install(doc: &mut String, artifact: &ArchivedBinary, name: &str) {
    let _ = writeln!(doc, "  def install");
    if artifact.archs.contains(&Arch::Arm64) && artifact.archs.contains(&Arch::X86_64) {
        // Multi-arch tarballs hold one directory per architecture.
        let _ = writeln!(
            doc,
            "    arch_dir = Hardware::CPU.arm? ? \"{}\" : \"{}\"",
            Arch::Arm64.label(),
            Arch::X86_64.label()
        );
        let _ = writeln!(doc, "    bin.install \"#{{arch_dir}}/{}\"", escape_literal(name));
    } else {
        let _ = writeln!(doc, "    bin.install \"{}\"", escape_literal(name));
    }
    let _ = writeln!(doc, "  end");
}

/// Escape a value for a double-quoted Ruby string with no interpolation.
fn escape_literal(s: &str) -> String {
    escape_command(s).replace("#{", "\\#{")
}

/// Escape a user command, keeping `#{bin}`-style interpolation intact.
fn escape_command(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tap() -> Tap {
        Tap::new(
            "nntools",
            "/tmp/homebrew-nntools",
            "https://github.com/nikolai/homebrew-nntools.git",
        )
    }

    fn formula(upload_type: UploadType) -> Formula {
        Formula {
            name: "mytool".into(),
            details: "A \"handy\" tool".into(),
            homepage: "https://github.com/nikolai/mytool".into(),
            license: "MIT".into(),
            upload_type,
            test_command: Some(TestCommand::DefaultCommand),
            tap: Some("nntools".into()),
            ..Default::default()
        }
    }

    fn binary(arch: Arch, file: &str, sha: Option<&str>) -> ArchivedBinary {
        ArchivedBinary {
            archs: vec![arch],
            path: PathBuf::from(format!("/tmp/out/{file}")),
            sha256: sha.map(String::from),
            size: 42,
        }
    }

    fn info(binaries: Vec<ArchivedBinary>) -> FormulaPublishInfo {
        let asset_urls = binaries
            .iter()
            .map(|b| {
                format!(
                    "https://github.com/nikolai/mytool/releases/download/1.0.1/{}",
                    b.file_name()
                )
            })
            .collect();
        FormulaPublishInfo {
            version: "1.0.1".into(),
            install_name: "mytool".into(),
            asset_urls,
            binaries,
        }
    }

    #[test]
    fn renders_single_binary_formula() {
        let info = info(vec![binary(Arch::Arm64, "mytool-arm64", Some("abc123"))]);
        let doc = FormulaDocumentGenerator::render(&formula(UploadType::Binary), Some(&tap()), &info).unwrap();

        assert!(doc.contains("# brew install nikolai/nntools/mytool"));
        assert!(doc.contains("class Mytool < Formula"));
        assert!(doc.contains("desc \"A \\\"handy\\\" tool\""));
        assert!(doc.contains("version \"1.0.1\""));
        assert!(doc.contains("sha256 \"abc123\""));
        assert!(doc.contains("bin.install \"mytool-arm64\" => \"mytool\""));
        assert!(doc.contains("system \"#{bin}/mytool\", \"--version\""));
        assert!(!doc.contains("on_arm do"));
        assert!(doc.ends_with("end\n"));
    }

    #[test]
    fn renders_one_install_stanza_per_architecture() {
        let info = info(vec![
            binary(Arch::Arm64, "mytool-arm64", Some("armsha")),
            binary(Arch::X86_64, "mytool-x86_64", Some("intelsha")),
        ]);
        let doc = FormulaDocumentGenerator::render(&formula(UploadType::Binary), Some(&tap()), &info).unwrap();

        assert!(doc.contains("  on_arm do\n"));
        assert!(doc.contains("  on_intel do\n"));
        assert_eq!(doc.matches("def install").count(), 2);
        assert!(doc.contains("      bin.install \"mytool-x86_64\" => \"mytool\""));
        assert!(doc.contains("armsha"));
        assert!(doc.contains("intelsha"));
    }

    #[test]
    fn renders_single_extraction_stanza_for_tarball() {
        let mut archive = binary(Arch::Arm64, "mytool-1.0.1.tar.gz", Some("tarsha"));
        archive.archs = vec![Arch::Arm64, Arch::X86_64];
        let info = info(vec![archive]);
        let doc = FormulaDocumentGenerator::render(&formula(UploadType::Tarball), Some(&tap()), &info).unwrap();

        assert_eq!(doc.matches("url \"").count(), 1);
        assert_eq!(doc.matches("def install").count(), 1);
        assert!(doc.contains("arch_dir = Hardware::CPU.arm? ? \"arm64\" : \"x86_64\""));
        assert!(doc.contains("bin.install \"#{arch_dir}/mytool\""));
    }

    #[test]
    fn single_arch_tarball_installs_binary_directly() {
        let info = info(vec![binary(Arch::X86_64, "mytool-1.0.1.tar.gz", Some("tarsha"))]);
        let doc = FormulaDocumentGenerator::render(&formula(UploadType::Tarball), Some(&tap()), &info).unwrap();
        assert!(doc.contains("    bin.install \"mytool\"\n"));
    }

    #[test]
    fn renders_custom_and_missing_test_commands() {
        let info = info(vec![binary(Arch::Arm64, "mytool-arm64", Some("abc"))]);

        let mut custom = formula(UploadType::Binary);
        custom.test_command = Some(TestCommand::Custom("#{bin}/mytool --help".into()));
        let doc = FormulaDocumentGenerator::render(&custom, Some(&tap()), &info).unwrap();
        assert!(doc.contains("system \"#{bin}/mytool --help\""));

        let mut none = formula(UploadType::Binary);
        none.test_command = None;
        let doc = FormulaDocumentGenerator::render(&none, Some(&tap()), &info).unwrap();
        assert!(!doc.contains("test do"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let info = info(vec![
            binary(Arch::Arm64, "mytool-arm64", Some("armsha")),
            binary(Arch::X86_64, "mytool-x86_64", Some("intelsha")),
        ]);
        let formula = formula(UploadType::Binary);

        let first = FormulaDocumentGenerator::render(&formula, Some(&tap()), &info).unwrap();
        let second = FormulaDocumentGenerator::render(&formula, Some(&tap()), &info).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn fails_without_checksum() {
        let info = info(vec![binary(Arch::Arm64, "mytool-arm64", None)]);
        let err = FormulaDocumentGenerator::render(&formula(UploadType::Binary), Some(&tap()), &info).unwrap_err();
        assert_eq!(
            err,
            Error::MissingSha256 {
                artifact: "mytool-arm64".into()
            }
        );
    }

    #[test]
    fn fails_without_tap_or_owner() {
        let info = info(vec![binary(Arch::Arm64, "mytool-arm64", Some("abc"))]);
        let formula = formula(UploadType::Binary);

        let err = FormulaDocumentGenerator::render(&formula, None, &info).unwrap_err();
        assert!(matches!(err, Error::MissingTap { .. }));

        let mut local_only = tap();
        local_only.remote_path = "/srv/git/homebrew-nntools".into();
        let err = FormulaDocumentGenerator::render(&formula, Some(&local_only), &info).unwrap_err();
        assert!(matches!(err, Error::MissingGitHubUsername { .. }));
    }

    #[test]
    fn fails_when_urls_do_not_match_artifacts() {
        let mut info = info(vec![binary(Arch::Arm64, "mytool-arm64", Some("abc"))]);
        info.asset_urls.clear();
        let err = FormulaDocumentGenerator::render(&formula(UploadType::Binary), Some(&tap()), &info).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
