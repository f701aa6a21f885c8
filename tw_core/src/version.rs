//! Release version resolution.
//!
//! A publish is given either an exact version or a request to bump one part
//! of the previous release:
//! - Explicit: `1.2.3`, `2.0.0-rc.1`, `1.0.0+build.7`
//! - Increment: `major`, `minor` or `patch` of the previous release
//!
//! Bump rules:
//! - `major`: `1.2.3 -> 2.0.0`
//! - `minor`: `1.2.3 -> 1.3.0`
//! - `patch`: `1.2.3 -> 1.2.4`
//!
//! Pre-release and build suffixes of the previous version are dropped by a bump.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::Error;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
    )
    .expect("semver pattern is valid")
});

/// Which component of the previous version to bump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionPart {
    Major,
    Minor,
    Patch,
}

impl FromStr for VersionPart {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(VersionPart::Major),
            "minor" => Ok(VersionPart::Minor),
            "patch" => Ok(VersionPart::Patch),
            other => Err(Error::InvalidInput {
                message: format!("unknown version part '{}': expected major, minor or patch", other),
            }),
        }
    }
}

/// The version argument of a publish: an exact version or a bump request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseVersionInfo {
    Version(String),
    Increment(VersionPart),
}

impl ReleaseVersionInfo {
    /// Parse a CLI argument. `major`/`minor`/`patch` are bump requests,
    /// anything else is taken as an explicit version.
    pub fn from_arg(arg: &str) -> Self {
        match arg.parse::<VersionPart>() {
            Ok(part) => ReleaseVersionInfo::Increment(part),
            Err(_) => ReleaseVersionInfo::Version(arg.trim().to_string()),
        }
    }

    pub fn needs_previous_version(&self) -> bool {
        matches!(self, ReleaseVersionInfo::Increment(_))
    }
}

/// A parsed `major.minor.patch[-pre][+build]` version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
    pub build: Option<String>,
}

impl SemanticVersion {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidVersionNumber {
            version: s.to_string(),
        };

        let caps = SEMVER.captures(s).ok_or_else(invalid)?;
        let number = |i: usize| -> Result<u64, Error> {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .ok_or_else(invalid)
        };

        Ok(SemanticVersion {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre_release: caps.get(4).map(|m| m.as_str().to_string()),
            build: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }

    /// Fails with `InvalidVersionNumber` when the bumped part would overflow.
    pub fn bump(&self, part: VersionPart) -> Result<SemanticVersion, Error> {
        let next = |n: u64| {
            n.checked_add(1).ok_or_else(|| Error::InvalidVersionNumber {
                version: self.to_string(),
            })
        };
        let (major, minor, patch) = match part {
            VersionPart::Major => (next(self.major)?, 0, 0),
            VersionPart::Minor => (self.major, next(self.minor)?, 0),
            VersionPart::Patch => (self.major, self.minor, next(self.patch)?),
        };

        Ok(SemanticVersion {
            major,
            minor,
            patch,
            pre_release: None,
            build: None,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

/// Turn a version request plus the previous release into the next version string.
///
/// Pure: no I/O, the previous version is fetched by the caller.
pub fn resolve_version(
    request: &ReleaseVersionInfo,
    previous_version: Option<&str>,
) -> Result<String, Error> {
    match request {
        ReleaseVersionInfo::Version(version) => {
            SemanticVersion::parse(version)?;
            Ok(version.clone())
        }
        ReleaseVersionInfo::Increment(part) => {
            let previous = previous_version
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(Error::NoPreviousVersionToIncrement)?;
            let previous = previous.strip_prefix('v').unwrap_or(previous);

            Ok(SemanticVersion::parse(previous)?.bump(*part)?.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bump(part: VersionPart, previous: &str) -> Result<String, Error> {
        resolve_version(&ReleaseVersionInfo::Increment(part), Some(previous))
    }

    #[test]
    fn explicit_version_is_returned_unchanged() {
        let request = ReleaseVersionInfo::Version("1.0.1".to_string());
        assert_eq!(resolve_version(&request, None).unwrap(), "1.0.1");
        assert_eq!(resolve_version(&request, Some("9.9.9")).unwrap(), "1.0.1");
    }

    #[test]
    fn explicit_version_accepts_prerelease_and_build() {
        for v in ["2.0.0-rc.1", "1.0.0+build.7", "1.0.0-alpha-1+sha.abc"] {
            let request = ReleaseVersionInfo::Version(v.to_string());
            assert_eq!(resolve_version(&request, None).unwrap(), v);
        }
    }

    #[test]
    fn explicit_version_rejects_malformed_input() {
        for v in ["", "1", "1.2", "1.2.x", "v1.2.3", "01.2.3", "1.2.3-", "1.2.3.4"] {
            let request = ReleaseVersionInfo::Version(v.to_string());
            assert_eq!(
                resolve_version(&request, None),
                Err(Error::InvalidVersionNumber {
                    version: v.to_string()
                }),
                "{v} should be rejected"
            );
        }
    }

    #[test]
    fn bumps_each_part() {
        assert_eq!(bump(VersionPart::Patch, "1.2.3").unwrap(), "1.2.4");
        assert_eq!(bump(VersionPart::Minor, "1.2.3").unwrap(), "1.3.0");
        assert_eq!(bump(VersionPart::Major, "1.2.3").unwrap(), "2.0.0");
    }

    #[test]
    fn bump_drops_prerelease_and_tolerates_tag_prefix() {
        assert_eq!(bump(VersionPart::Patch, "1.2.3-beta.2").unwrap(), "1.2.4");
        assert_eq!(bump(VersionPart::Minor, "v0.9.12").unwrap(), "0.10.0");
    }

    #[test]
    fn increment_without_previous_version_fails() {
        for part in [VersionPart::Major, VersionPart::Minor, VersionPart::Patch] {
            let request = ReleaseVersionInfo::Increment(part);
            assert_eq!(
                resolve_version(&request, None),
                Err(Error::NoPreviousVersionToIncrement)
            );
            assert_eq!(
                resolve_version(&request, Some("  ")),
                Err(Error::NoPreviousVersionToIncrement)
            );
        }
    }

    #[test]
    fn increment_of_unparsable_previous_version_fails() {
        assert_eq!(
            bump(VersionPart::Patch, "latest"),
            Err(Error::InvalidVersionNumber {
                version: "latest".to_string()
            })
        );
    }

    #[test]
    fn increment_past_the_largest_part_fails() {
        let max = u64::MAX;
        assert_eq!(
            bump(VersionPart::Major, &format!("{max}.0.0")),
            Err(Error::InvalidVersionNumber {
                version: format!("{max}.0.0")
            })
        );
        assert!(bump(VersionPart::Patch, &format!("1.2.{max}")).is_err());
        assert_eq!(bump(VersionPart::Minor, &format!("1.2.{max}")).unwrap(), "1.3.0");
    }

    #[test]
    fn from_arg_distinguishes_bumps_from_versions() {
        assert_eq!(
            ReleaseVersionInfo::from_arg("Minor"),
            ReleaseVersionInfo::Increment(VersionPart::Minor)
        );
        assert_eq!(
            ReleaseVersionInfo::from_arg("3.1.0"),
            ReleaseVersionInfo::Version("3.1.0".to_string())
        );
    }

    proptest! {
        #[test]
        fn explicit_versions_round_trip(major in 0u64..10_000, minor in 0u64..10_000, patch in 0u64..10_000) {
            let v = format!("{major}.{minor}.{patch}");
            let request = ReleaseVersionInfo::Version(v.clone());
            prop_assert_eq!(resolve_version(&request, None).unwrap(), v);
        }

        #[test]
        fn patch_bump_only_touches_patch(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let next = bump(VersionPart::Patch, &format!("{major}.{minor}.{patch}")).unwrap();
            prop_assert_eq!(next, format!("{}.{}.{}", major, minor, patch + 1));
        }

        #[test]
        fn major_bump_resets_lower_parts(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let next = bump(VersionPart::Major, &format!("{major}.{minor}.{patch}")).unwrap();
            prop_assert_eq!(next, format!("{}.0.0", major + 1));
        }
    }
}
