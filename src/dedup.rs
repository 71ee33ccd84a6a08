use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::utils::error::Result;

/// Set of offer ids that were already handled.
#[async_trait]
pub trait DedupStore: Send {
    fn has(&self, id: &str) -> bool;

    /// Persists `id`. The in-memory set only changes once the write succeeded,
    /// so a failed record is retried on the next sighting.
    async fn record(&mut self, id: &str) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only log of ids, one per line.
#[derive(Debug)]
pub struct FileDedupStore {
    path: PathBuf,
    seen: HashSet<String>,
    // The existing log ended without a newline
    needs_separator: bool,
}

impl FileDedupStore {
    /// Loads the log. A missing file is an empty set.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (seen, needs_separator) = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => (
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
                !contents.is_empty() && !contents.ends_with('\n'),
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => (HashSet::new(), false),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), count = seen.len(), "Loaded sent offer ids");
        Ok(Self {
            path,
            seen,
            needs_separator,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    fn has(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    async fn record(&mut self, id: &str) -> Result<()> {
        if self.seen.contains(id) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = if self.needs_separator {
            format!("\n{}\n", id)
        } else {
            format!("{}\n", id)
        };
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.needs_separator = false;
        self.seen.insert(id.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}
