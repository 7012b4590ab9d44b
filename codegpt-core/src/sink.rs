//! Destination documents and the flusher that keeps them in step with the
//! cumulative output.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{CodeGptError, CoreResult};

/// A document the answer is rendered into.
///
/// `replace_all` overwrites the whole content; there is no incremental patching.
#[async_trait]
pub trait Document: Send {
    /// Human-readable location used in notifications.
    fn location(&self) -> String;

    async fn replace_all(&mut self, text: &str) -> CoreResult<()>;

    /// Move the visible view to the end of the document.
    async fn reveal_end(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Persist the current content.
    async fn save(&mut self) -> CoreResult<()>;
}

/// File-backed document. Created (truncated) on open, rewritten on every
/// `replace_all`, fsynced on `save`.
pub struct FileDocument {
    path: PathBuf,
    file: File,
    current: String,
    echo: Option<Box<dyn Write + Send>>,
    shown: usize,
}

impl FileDocument {
    pub async fn create(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence(&path, e))?;
        }
        let file = File::create(&path).await.map_err(|e| persistence(&path, e))?;
        tracing::debug!(path = %path.display(), "destination document created");
        Ok(Self {
            path,
            file,
            current: String::new(),
            echo: None,
            shown: 0,
        })
    }

    /// Mirror newly revealed text to `out` (e.g. stdout) so the answer can be followed live.
    pub fn with_echo(mut self, out: Box<dyn Write + Send>) -> Self {
        self.echo = Some(out);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.current
    }
}

fn persistence(path: &Path, source: std::io::Error) -> CodeGptError {
    CodeGptError::Persistence {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl Document for FileDocument {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn replace_all(&mut self, text: &str) -> CoreResult<()> {
        if text == self.current {
            return Ok(());
        }
        let path = self.path.clone();
        self.file.set_len(0).await.map_err(|e| persistence(&path, e))?;
        self.file
            .seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| persistence(&path, e))?;
        self.file
            .write_all(text.as_bytes())
            .await
            .map_err(|e| persistence(&path, e))?;
        self.file.flush().await.map_err(|e| persistence(&path, e))?;
        self.current.clear();
        self.current.push_str(text);
        Ok(())
    }

    async fn reveal_end(&mut self) -> CoreResult<()> {
        if self.shown > self.current.len() || !self.current.is_char_boundary(self.shown) {
            self.shown = self.current.len();
            return Ok(());
        }
        if let Some(out) = self.echo.as_mut() {
            out.write_all(self.current[self.shown..].as_bytes())?;
            out.flush()?;
        }
        self.shown = self.current.len();
        Ok(())
    }

    async fn save(&mut self) -> CoreResult<()> {
        let path = self.path.clone();
        self.file.flush().await.map_err(|e| persistence(&path, e))?;
        self.file.sync_all().await.map_err(|e| persistence(&path, e))?;
        tracing::debug!(path = %self.path.display(), bytes = self.current.len(), "document saved");
        Ok(())
    }
}

/// In-memory document that counts writes and saves.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    pub text: String,
    /// Text passed to each `replace_all`, oldest first.
    pub history: Vec<String>,
    pub writes: usize,
    pub reveals: usize,
    pub saves: usize,
    /// When set, `save` fails with a persistence error.
    pub fail_save: bool,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Document for MemoryDocument {
    fn location(&self) -> String {
        "memory".into()
    }

    async fn replace_all(&mut self, text: &str) -> CoreResult<()> {
        self.writes += 1;
        self.history.push(text.to_string());
        self.text.clear();
        self.text.push_str(text);
        Ok(())
    }

    async fn reveal_end(&mut self) -> CoreResult<()> {
        self.reveals += 1;
        Ok(())
    }

    async fn save(&mut self) -> CoreResult<()> {
        if self.fail_save {
            return Err(CodeGptError::Persistence {
                path: self.location(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.saves += 1;
        Ok(())
    }
}

/// Writes the cumulative output into a document after each read and saves it once.
pub struct Flusher<D: Document> {
    doc: D,
    flushes: u64,
    saved: bool,
}

impl<D: Document> Flusher<D> {
    pub fn new(doc: D) -> Self {
        Self {
            doc,
            flushes: 0,
            saved: false,
        }
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn into_document(self) -> D {
        self.doc
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Overwrite the document with `cumulative` and follow its end.
    pub async fn flush(&mut self, cumulative: &str) -> CoreResult<()> {
        self.doc.replace_all(cumulative).await?;
        self.doc.reveal_end().await?;
        self.flushes += 1;
        Ok(())
    }

    /// Save the document; later calls are no-ops.
    pub async fn save_once(&mut self) -> CoreResult<bool> {
        if self.saved {
            return Ok(false);
        }
        self.saved = true;
        self.doc.save().await?;
        Ok(true)
    }
}
