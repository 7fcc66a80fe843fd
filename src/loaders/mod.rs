// Document loaders
// Pull raw files from a GitHub repository or a local directory

pub mod directory;
pub mod github;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use directory::DirectoryLoader;
pub use github::{GithubClient, GithubRepositoryLoader};

/// Where a document came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    Github {
        owner: String,
        repo: String,
        branch: String,
    },
    Directory {
        root: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Path relative to the repository root or the loader directory
    pub file_path: String,
    pub file_name: String,
    /// Lower-cased extension including the leading dot, empty when absent
    pub extension: String,
    pub source: DocumentSource,
}

/// One loaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[inline]
    pub fn new(file_path: &str, text: String, source: DocumentSource) -> Self {
        let path = Path::new(file_path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let id = match &source {
            DocumentSource::Github { owner, repo, .. } => {
                format!("github:{}/{}:{}", owner, repo, file_path)
            }
            DocumentSource::Directory { .. } => format!("file:{}", file_path),
        };

        Self {
            id,
            text,
            metadata: DocumentMetadata {
                file_path: file_path.to_string(),
                file_name,
                extension: extension_of(file_path),
                source,
            },
        }
    }
}

/// `.java` for `src/Main.JAVA`, empty string when there is no extension
#[inline]
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Case-insensitive extension match against a `.ext` list
#[inline]
pub fn has_extension(path: &str, extensions: &[String]) -> bool {
    let ext = extension_of(path);
    !ext.is_empty() && extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}
