//! Release-host collaborator backed by the GitHub CLI (`gh`).

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use tw_core::Error;

use crate::process::run_command;
use crate::traits::{ReleaseAsset, ReleaseHost, ReleaseNotes, ReleaseRequest};

#[derive(Debug, Deserialize)]
struct ReleaseView {
    #[serde(default, rename = "tagName")]
    tag_name: String,
    #[serde(default)]
    assets: Vec<AssetView>,
}

#[derive(Debug, Deserialize)]
struct AssetView {
    name: String,
    url: String,
}

/// Strip a leading `v` so `v1.2.3` and `1.2.3` tags resolve alike.
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(tag)
}

fn is_missing_release(err: &Error) -> bool {
    matches!(err, Error::CommandFailed { stderr, .. }
        if stderr.contains("release not found") || stderr.contains("no releases found"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GhCli;

impl GhCli {
    pub fn new() -> Self {
        Self
    }

    async fn view(&self, project_path: &Path, tag: Option<&str>, fields: &str) -> Result<Option<ReleaseView>, Error> {
        let mut args = vec!["release", "view"];
        if let Some(tag) = tag {
            args.push(tag);
        }
        args.extend(["--json", fields]);

        match run_command("gh", &args, Some(project_path)).await {
            Ok(out) => serde_json::from_str(&out.stdout)
                .map(Some)
                .map_err(|e| Error::CommandFailed {
                    command: "gh release view".to_string(),
                    code: None,
                    stderr: format!("unexpected output: {e}"),
                }),
            Err(e) if is_missing_release(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReleaseHost for GhCli {
    async fn previous_release_version(&self, project_path: &Path) -> Result<Option<String>, Error> {
        let version = self
            .view(project_path, None, "tagName")
            .await?
            .map(|view| normalize_tag(&view.tag_name).to_string())
            .filter(|tag| !tag.is_empty());
        debug!(?version, "previous release");
        Ok(version)
    }

    async fn create_release(&self, request: &ReleaseRequest) -> Result<(), Error> {
        let mut notes_file = None;
        let mut args: Vec<String> = vec![
            "release".into(),
            "create".into(),
            request.version.clone(),
        ];
        args.extend(
            request
                .assets
                .iter()
                .map(|p| p.to_string_lossy().to_string()),
        );
        args.extend(["--title".into(), request.version.clone()]);

        match &request.notes {
            ReleaseNotes::Generate => args.push("--generate-notes".into()),
            ReleaseNotes::Text(text) => {
                let mut file = tempfile::NamedTempFile::new().map_err(|e| Error::io(std::env::temp_dir(), e))?;
                file.write_all(text.as_bytes())
                    .map_err(|e| Error::io(file.path(), e))?;
                args.push("--notes-file".into());
                args.push(file.path().to_string_lossy().to_string());
                notes_file = Some(file);
            }
        }

        info!(version = %request.version, assets = request.assets.len(), "creating release");

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = run_command("gh", &arg_refs, Some(&request.project_path)).await;
        drop(notes_file);

        result.map(|_| ()).map_err(|e| match e {
            Error::CommandFailed { stderr, .. } if stderr.contains("already exists") => {
                Error::ReleaseConflict {
                    version: request.version.clone(),
                    message: stderr,
                }
            }
            other => other,
        })
    }

    async fn release_assets(&self, project_path: &Path, version: &str) -> Result<Vec<ReleaseAsset>, Error> {
        let view = self.view(project_path, Some(version), "assets").await?;
        Ok(view
            .map(|v| v.assets)
            .unwrap_or_default()
            .into_iter()
            .map(|a| ReleaseAsset {
                name: a.name,
                url: a.url,
            })
            .collect())
    }

    async fn latest_release_asset_url(&self, project_path: &Path) -> Result<Option<String>, Error> {
        let view = self.view(project_path, None, "assets").await?;
        Ok(view.and_then(|v| v.assets.into_iter().next()).map(|a| a.url))
    }

    async fn create_repository(&self, repo: &Path, name: &str, private: bool) -> Result<(), Error> {
        let source = format!("--source={}", repo.display());
        let visibility = if private { "--private" } else { "--public" };
        run_command(
            "gh",
            &["repo", "create", name, visibility, &source, "--remote=origin", "--push"],
            Some(repo),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_v_prefix_only_before_digits() {
        assert_eq!(normalize_tag("v1.2.3"), "1.2.3");
        assert_eq!(normalize_tag("1.2.3"), "1.2.3");
        assert_eq!(normalize_tag(" v0.1.0\n"), "0.1.0");
        assert_eq!(normalize_tag("vnext"), "vnext");
    }

    #[test]
    fn decodes_release_view() {
        let json = r#"{"tagName":"1.0.0","assets":[{"name":"mytool-arm64","url":"https://github.com/o/r/releases/download/1.0.0/mytool-arm64","size":10}]}"#;
        let view: ReleaseView = serde_json::from_str(json).unwrap();
        assert_eq!(view.tag_name, "1.0.0");
        assert_eq!(view.assets.len(), 1);
        assert_eq!(view.assets[0].name, "mytool-arm64");
    }

    #[test]
    fn missing_release_is_recognized() {
        let err = Error::CommandFailed {
            command: "gh release view".into(),
            code: Some(1),
            stderr: "release not found".into(),
        };
        assert!(is_missing_release(&err));
        assert!(!is_missing_release(&Error::ReleaseNotesEmpty));
    }
}
