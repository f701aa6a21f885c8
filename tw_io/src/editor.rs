//! Text-editor collaborator using `$VISUAL` / `$EDITOR`.

use std::path::Path;

use async_trait::async_trait;

use tw_core::Error;

use crate::process::run_interactive;
use crate::traits::TextEditor;

pub struct EditorCommand {
    command: String,
}

impl EditorCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// `$VISUAL`, then `$EDITOR`, then `vi`.
    pub fn from_env() -> Self {
        let command = ["VISUAL", "EDITOR"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string());
        Self::new(command)
    }
}

#[async_trait]
impl TextEditor for EditorCommand {
    async fn edit(&self, path: &Path) -> Result<(), Error> {
        // Editors are often configured with flags, e.g. "code --wait".
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or_else(|| Error::InvalidInput {
            message: "editor command is empty".to_string(),
        })?;
        let path = path.to_string_lossy();
        let mut args: Vec<&str> = parts.collect();
        args.push(&path);

        run_interactive(program, &args).await
    }
}
