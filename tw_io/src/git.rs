//! Source-control collaborator backed by the `git` CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use tw_core::Error;

use crate::process::run_command;
use crate::traits::SourceControl;

#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn git(&self, repo: &Path, args: &[&str]) -> Result<String, Error> {
        let repo = repo.to_string_lossy();
        let mut full = vec!["-C", &*repo];
        full.extend_from_slice(args);
        run_command("git", &full, None).await.map(|out| out.stdout)
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn remote_url(&self, repo: &Path) -> Result<String, Error> {
        let url = self.git(repo, &["remote", "get-url", "origin"]).await?;
        Ok(url.trim().to_string())
    }

    async fn commit_and_push(
        &self,
        repo: &Path,
        files: &[PathBuf],
        message: &str,
    ) -> Result<(), Error> {
        let paths: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(repo).unwrap_or(f).to_string_lossy().to_string())
            .collect();

        let mut add = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.git(repo, &add).await?;

        let mut status = vec!["status", "--porcelain", "--"];
        status.extend(paths.iter().map(String::as_str));
        if self.git(repo, &status).await?.trim().is_empty() {
            info!(repo = %repo.display(), "nothing to commit");
        } else {
            self.git(repo, &["commit", "-m", message]).await?;
        }

        self.git(repo, &["push"]).await?;
        Ok(())
    }

    async fn init_repository(&self, repo: &Path) -> Result<(), Error> {
        self.git(repo, &["init", "-b", "main"]).await?;
        self.git(repo, &["add", "."]).await?;
        self.git(repo, &["commit", "-m", "Initial commit"]).await?;
        Ok(())
    }
}
