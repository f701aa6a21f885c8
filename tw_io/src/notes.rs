//! Release-notes composition with a single editor retry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tw_core::Error;

use crate::traits::{ReleaseNotes, TextEditor};

/// Editor round-trips allowed after the first read comes back empty.
pub const MAX_NOTES_RETRIES: usize = 1;

/// Where release notes come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotesSource {
    /// Used verbatim.
    Text(String),
    /// Read from a file, opening the editor if it is empty.
    File(PathBuf),
    /// Written in the editor into a draft file.
    Edit,
    /// Generated by the release host.
    #[default]
    Generate,
}

/// Obtain release notes for a release.
///
/// `draft_path` is the file used for [`NotesSource::Edit`].
pub async fn compose_notes(
    source: &NotesSource,
    editor: &dyn TextEditor,
    draft_path: &Path,
) -> Result<ReleaseNotes, Error> {
    match source {
        NotesSource::Generate => Ok(ReleaseNotes::Generate),
        NotesSource::Text(text) => {
            if text.trim().is_empty() {
                return Err(Error::ReleaseNotesEmpty);
            }
            Ok(ReleaseNotes::Text(text.clone()))
        }
        NotesSource::File(path) => read_with_retry(path, editor, false)
            .await
            .map(ReleaseNotes::Text),
        NotesSource::Edit => {
            if let Some(parent) = draft_path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            if !draft_path.exists() {
                fs::write(draft_path, "").map_err(|e| Error::io(draft_path, e))?;
            }
            read_with_retry(draft_path, editor, true)
                .await
                .map(ReleaseNotes::Text)
        }
    }
}

async fn read_with_retry(
    path: &Path,
    editor: &dyn TextEditor,
    edit_first: bool,
) -> Result<String, Error> {
    if edit_first {
        editor.edit(path).await?;
    }

    for attempt in 0..=MAX_NOTES_RETRIES {
        let text = read_notes(path)?;
        if !text.trim().is_empty() {
            debug!(path = %path.display(), bytes = text.len(), "release notes ready");
            return Ok(text);
        }
        if attempt < MAX_NOTES_RETRIES {
            warn!(path = %path.display(), "release notes are empty, opening editor");
            editor.edit(path).await?;
        }
    }

    Err(Error::EmptyFileAfterRetry {
        path: path.to_path_buf(),
    })
}

/// A missing file reads as empty so the editor can create it.
fn read_notes(path: &Path) -> Result<String, Error> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockTextEditor;
    use tempfile::TempDir;

    #[tokio::test]
    async fn text_is_used_verbatim() {
        let editor = MockTextEditor::new();
        let notes = compose_notes(
            &NotesSource::Text("Fixed things".into()),
            &editor,
            Path::new("/unused"),
        )
        .await
        .unwrap();
        assert_eq!(notes, ReleaseNotes::Text("Fixed things".into()));
    }

    #[tokio::test]
    async fn empty_text_fails_without_editor() {
        let mut editor = MockTextEditor::new();
        editor.expect_edit().never();
        let err = compose_notes(&NotesSource::Text("  \n".into()), &editor, Path::new("/unused"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::ReleaseNotesEmpty);
    }

    #[tokio::test]
    async fn filled_file_never_opens_editor() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("NOTES.md");
        fs::write(&path, "Changes").unwrap();

        let mut editor = MockTextEditor::new();
        editor.expect_edit().never();

        let notes = compose_notes(&NotesSource::File(path), &editor, Path::new("/unused"))
            .await
            .unwrap();
        assert_eq!(notes, ReleaseNotes::Text("Changes".into()));
    }

    #[tokio::test]
    async fn empty_file_is_retried_once_in_editor() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("NOTES.md");
        fs::write(&path, "").unwrap();

        let mut editor = MockTextEditor::new();
        editor.expect_edit().times(1).returning(|p| {
            fs::write(p, "Written in editor").unwrap();
            Ok(())
        });

        let notes = compose_notes(&NotesSource::File(path), &editor, Path::new("/unused"))
            .await
            .unwrap();
        assert_eq!(notes, ReleaseNotes::Text("Written in editor".into()));
    }

    #[tokio::test]
    async fn still_empty_after_retry_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("NOTES.md");
        fs::write(&path, "").unwrap();

        let mut editor = MockTextEditor::new();
        editor.expect_edit().times(1).returning(|_| Ok(()));

        let err = compose_notes(&NotesSource::File(path.clone()), &editor, Path::new("/unused"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::EmptyFileAfterRetry { path });
    }

    #[tokio::test]
    async fn edit_creates_draft_and_allows_one_retry() {
        let tmp = TempDir::new().unwrap();
        let draft = tmp.path().join("notes/mytool-1.0.0.md");

        let mut editor = MockTextEditor::new();
        let mut calls = 0;
        editor.expect_edit().times(2).returning(move |p| {
            calls += 1;
            if calls == 2 {
                fs::write(p, "Second try").unwrap();
            }
            Ok(())
        });

        let notes = compose_notes(&NotesSource::Edit, &editor, &draft).await.unwrap();
        assert_eq!(notes, ReleaseNotes::Text("Second try".into()));
        assert!(draft.exists());
    }

    #[tokio::test]
    async fn generate_needs_no_content() {
        let editor = MockTextEditor::new();
        let notes = compose_notes(&NotesSource::Generate, &editor, Path::new("/unused"))
            .await
            .unwrap();
        assert_eq!(notes, ReleaseNotes::Generate);
    }
}
