//! Migration discovery on the filesystem.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};

/// Extensions picked up by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &["sql", "sh"];

/// How a migration file is executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Declarative SQL script (`.sql`).
    Script,
    /// Executable procedure run through an interpreter (`.sh`).
    Procedure,
    /// Any other extension. Never executed.
    Unknown(String),
}

impl ArtifactKind {
    /// Detect the kind from a filename's extension.
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "sql" => Self::Script,
            "sh" => Self::Procedure,
            _ => Self::Unknown(ext),
        }
    }

    /// Short label used in output.
    pub fn label(&self) -> &str {
        match self {
            Self::Script => "script",
            Self::Procedure => "procedure",
            Self::Unknown(ext) => ext,
        }
    }
}

/// A migration file discovered on disk.
///
/// Artifacts are recomputed from disk on every run and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationArtifact {
    /// File name, the artifact's identity.
    pub filename: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// SHA-256 of the file contents, hex encoded.
    pub checksum: String,
    /// Execution kind, from the extension.
    pub kind: ArtifactKind,
}

impl MigrationArtifact {
    /// Build an artifact from in-memory content.
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>, content: &[u8]) -> Self {
        let filename = filename.into();
        Self {
            kind: ArtifactKind::from_filename(&filename),
            checksum: compute_checksum(content),
            path: path.into(),
            filename,
        }
    }

    /// Read the file contents as text.
    pub async fn read_content(&self) -> MigrateResult<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Compute the checksum of migration content.
///
/// Only the bytes participate: no path, no modification time.
pub fn compute_checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Compare filenames in natural order.
///
/// Digit runs compare by numeric value, so `2_x.sql` sorts before `10_x.sql`.
/// Names that are naturally equal (`01` vs `1`) fall back to plain string order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_only(a, b).then_with(|| a.cmp(b))
}

fn natural_only(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_num = l_run.trim_start_matches('0');
                let r_num = r_run.trim_start_matches('0');

                let ord = l_num.len().cmp(&r_num.len()).then_with(|| l_num.cmp(r_num));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

/// Enumerates migration artifacts from a directory.
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl MigrationSource {
    /// Create a source over the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Restrict discovery to these extensions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// The directory being scanned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn accepts(&self, filename: &str) -> bool {
        if filename.starts_with('.') {
            return false;
        }
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }

    /// List all artifacts in natural filename order.
    ///
    /// A missing directory is created and yields an empty list.
    pub async fn list_artifacts(&self) -> MigrateResult<Vec<MigrationArtifact>> {
        let exists = tokio::fs::try_exists(&self.dir)
            .await
            .map_err(|e| MigrationError::read(&self.dir, e))?;
        if !exists {
            debug!(dir = %self.dir.display(), "Migrations directory missing, creating it");
            self.ensure_dir().await?;
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| MigrationError::read(&self.dir, e))?;
        let mut artifacts = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrationError::read(&self.dir, e))?
        {
            let path = entry.path();
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %path.display(), "Skipping migration with non UTF-8 name");
                continue;
            };

            if !self.accepts(&filename) {
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| MigrationError::read(&path, e))?;
            let is_file = if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta.is_file(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable symlink");
                        false
                    }
                }
            } else {
                file_type.is_file()
            };
            if !is_file {
                continue;
            }

            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| MigrationError::read(&path, e))?;
            artifacts.push(MigrationArtifact::new(filename, path, &content));
        }

        artifacts.sort_by(|a, b| natural_cmp(&a.filename, &b.filename));
        debug!(count = artifacts.len(), dir = %self.dir.display(), "Discovered migrations");

        Ok(artifacts)
    }
}
