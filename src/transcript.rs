//! Sample prompt/response transcript written once per streaming run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// Writes one representative prompt/response pair to disk.
///
/// Writes are serialized and truncate the file, so concurrent writers can
/// never interleave output.
#[derive(Debug)]
pub struct TranscriptWriter {
    path: PathBuf,
    lock: Mutex<()>,
    written: AtomicBool,
}

impl TranscriptWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            written: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a transcript has been written by this writer
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    pub async fn write(&self, prompt: &str, response: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut file = tokio::fs::File::create(&self.path).await?;
        file.write_all(render(prompt, response).as_bytes()).await?;
        file.flush().await?;

        self.written.store(true, Ordering::Release);
        tracing::debug!(path = %self.path.display(), "Sample transcript written");
        Ok(())
    }
}

pub fn render(prompt: &str, response: &str) -> String {
    format!(
        "=== PROMPT ===\n{}\n\n=== RESPONSE ===\n{}\n",
        prompt.trim(),
        response.trim()
    )
}
