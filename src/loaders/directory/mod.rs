#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use super::{Document, DocumentSource, has_extension};
use crate::config::LogsConfig;

/// Reads every matching file of a local directory as a document
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
}

impl DirectoryLoader {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P, extensions: Vec<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions,
            recursive: false,
        }
    }

    #[inline]
    pub fn from_config(config: &LogsConfig) -> Self {
        Self::new(&config.directory, config.extensions.clone()).recursive(config.recursive)
    }

    #[inline]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Matching file paths relative to the root, sorted. Hidden entries are skipped.
    #[inline]
    pub async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(&self.root)
            .await
            .with_context(|| format!("Directory not found: {}", self.root.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Not a directory: {}", self.root.display());
        }

        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(path);
                    }
                } else if self.accepts(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load every matching file. An empty result is an error.
    #[inline]
    pub async fn load_data(&self) -> Result<Vec<Document>> {
        let files = self.list_files().await?;
        if files.is_empty() {
            anyhow::bail!(
                "No files with extensions {:?} found in {}",
                self.extensions,
                self.root.display()
            );
        }

        let source = DocumentSource::Directory {
            root: self.root.display().to_string(),
        };

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let bytes = fs::read(&path)
                .await
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            debug!("Read {} ({} bytes)", relative, bytes.len());
            documents.push(Document::new(
                &relative,
                String::from_utf8_lossy(&bytes).into_owned(),
                source.clone(),
            ));
        }

        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }

    fn accepts(&self, path: &Path) -> bool {
        self.extensions.is_empty() || has_extension(&path.to_string_lossy(), &self.extensions)
    }
}
