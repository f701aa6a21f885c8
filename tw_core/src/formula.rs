use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::Error;

/// How a release asset is shipped: the raw executable or a gzipped tarball.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    #[default]
    Binary,
    Tarball,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::Binary => "binary",
            UploadType::Tarball => "tarball",
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(UploadType::Binary),
            "tarball" => Ok(UploadType::Tarball),
            other => Err(Error::InvalidInput {
                message: format!("unknown upload type '{}': expected binary or tarball", other),
            }),
        }
    }
}

/// What the formula's `test do` block runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "command", rename_all = "camelCase")]
pub enum TestCommand {
    /// `<name> --version` smoke test
    DefaultCommand,
    Custom(String),
}

/// A formula as the pipeline sees it, independent of how it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub local_project_path: PathBuf,
    #[serde(default)]
    pub upload_type: UploadType,
    #[serde(default)]
    pub test_command: Option<TestCommand>,
    #[serde(default)]
    pub extra_build_args: Vec<String>,
    /// Name of the owning tap. Lookup only; the tap owns the formula.
    #[serde(default)]
    pub tap: Option<String>,
}

impl Formula {
    pub fn new(name: impl Into<String>) -> Self {
        Formula {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Ruby class name for the formula file: `my-tool` -> `MyTool`.
    ///
    /// A leading digit is spelled out (`7zip` -> `Sevenzip`) since Ruby
    /// constants must start with a letter.
    pub fn class_name(&self) -> String {
        const DIGITS: [&str; 10] = [
            "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine",
        ];

        let camel: String = self
            .name
            .split(|c: char| c == '-' || c == '_' || c == '.' || c == '@')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect();

        match camel.chars().next().and_then(|c| c.to_digit(10)) {
            Some(digit) => format!("{}{}", DIGITS[digit as usize], &camel[1..]),
            None => camel,
        }
    }

    /// Copy every mutable field from `other`, keeping this record's identity.
    pub fn apply_update(&mut self, other: &Formula) {
        self.details = other.details.clone();
        self.homepage = other.homepage.clone();
        self.license = other.license.clone();
        self.local_project_path = other.local_project_path.clone();
        self.upload_type = other.upload_type;
        self.test_command = other.test_command.clone();
        self.extra_build_args = other.extra_build_args.clone();
    }
}

/// A tap: a named local working copy plus its remote, owning a set of formulas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Tap {
    pub name: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(default)]
    pub formulas: Vec<Formula>,
}

impl Tap {
    pub fn new(name: impl Into<String>, local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Tap {
            name: name.into(),
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            formulas: Vec::new(),
        }
    }

    pub fn formula(&self, name: &str) -> Option<&Formula> {
        self.formulas.iter().find(|f| f.name == name)
    }

    /// Directory inside the working copy that holds the `.rb` files.
    pub fn formula_dir(&self) -> PathBuf {
        self.local_path.join("Formula")
    }

    pub fn formula_file(&self, formula_name: &str) -> PathBuf {
        self.formula_dir().join(format!("{}.rb", formula_name))
    }

    /// Tap name as used by `brew tap`: the repository name without `homebrew-`.
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix("homebrew-").unwrap_or(&self.name)
    }
}

/// Owner/repository pair parsed from a GitHub remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRemote {
    pub owner: String,
    pub repo: String,
}

impl GitHubRemote {
    /// Parse `https://github.com/<owner>/<repo>(.git)` or `git@github.com:<owner>/<repo>(.git)`.
    pub fn parse(remote: &str) -> Option<Self> {
        let remote = remote.trim();
        let rest = remote
            .strip_prefix("https://github.com/")
            .or_else(|| remote.strip_prefix("http://github.com/"))
            .or_else(|| remote.strip_prefix("ssh://git@github.com/"))
            .or_else(|| remote.strip_prefix("git@github.com:"))?;

        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let mut parts = rest.split('/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let repo = parts.next().filter(|s| !s.is_empty())?;
        if parts.next().is_some() {
            return None;
        }

        Some(GitHubRemote {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_name_camel_cases_separators() {
        assert_eq!(Formula::new("mytool").class_name(), "Mytool");
        assert_eq!(Formula::new("my-tool").class_name(), "MyTool");
        assert_eq!(Formula::new("nn_tools.cli").class_name(), "NnToolsCli");
        assert_eq!(Formula::new("7zip").class_name(), "Sevenzip");
        assert_eq!(Formula::new("2-fa").class_name(), "TwoFa");
    }

    #[test]
    fn apply_update_keeps_identity() {
        let mut existing = Formula {
            name: "mytool".into(),
            details: "old".into(),
            tap: Some("nntools".into()),
            ..Default::default()
        };
        let incoming = Formula {
            name: "other".into(),
            details: "new".into(),
            homepage: "https://example.com".into(),
            upload_type: UploadType::Tarball,
            test_command: Some(TestCommand::Custom("mytool -h".into())),
            extra_build_args: vec!["--features".into(), "cli".into()],
            tap: Some("elsewhere".into()),
            ..Default::default()
        };

        existing.apply_update(&incoming);

        assert_eq!(existing.name, "mytool");
        assert_eq!(existing.tap.as_deref(), Some("nntools"));
        assert_eq!(existing.details, "new");
        assert_eq!(existing.upload_type, UploadType::Tarball);
        assert_eq!(existing.extra_build_args.len(), 2);
    }

    #[test]
    fn parses_github_remotes() {
        let expected = GitHubRemote {
            owner: "nikolai".into(),
            repo: "homebrew-nntools".into(),
        };
        assert_eq!(
            GitHubRemote::parse("https://github.com/nikolai/homebrew-nntools.git"),
            Some(expected.clone())
        );
        assert_eq!(
            GitHubRemote::parse("git@github.com:nikolai/homebrew-nntools.git"),
            Some(expected.clone())
        );
        assert_eq!(
            GitHubRemote::parse("https://github.com/nikolai/homebrew-nntools/"),
            Some(expected)
        );
        assert_eq!(GitHubRemote::parse("https://gitlab.com/a/b"), None);
        assert_eq!(GitHubRemote::parse("https://github.com/onlyowner"), None);
    }

    #[test]
    fn upload_type_parses_case_insensitively() {
        assert_eq!("Tarball".parse::<UploadType>().unwrap(), UploadType::Tarball);
        assert!("zip".parse::<UploadType>().is_err());
    }

    #[test]
    fn tap_paths_and_short_name() {
        let tap = Tap::new("homebrew-nntools", "/tmp/homebrew-nntools", "");
        assert_eq!(tap.short_name(), "nntools");
        assert_eq!(
            tap.formula_file("mytool"),
            PathBuf::from("/tmp/homebrew-nntools/Formula/mytool.rb")
        );
    }
}
