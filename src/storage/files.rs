//! Resource files on disk
//!
//! Mirrored files live under the output root. Original bytes of documents
//! that get rewritten are kept content-addressed under
//! `<output-root>/.sumi-mirror/originals/` so the rewritten copy can always
//! be regenerated and the fetched bytes stay auditable.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Hex-encoded SHA-256 of a resource body
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes and reads the files of one output root
#[derive(Debug, Clone)]
pub struct ResourceFiles {
    root: PathBuf,
    originals: PathBuf,
}

impl ResourceFiles {
    pub fn new(root: &Path, state_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            originals: state_dir.join("originals"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a `/`-separated local path
    pub fn resolve(&self, local_path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(local_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if local_path.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("local path '{}' leaves the output root", local_path),
            ));
        }
        Ok(self.root.join(relative))
    }

    /// Atomically writes a resource: temp file in the target directory, then rename
    pub async fn write(&self, local_path: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let target = self.resolve(local_path)?;
        write_atomic(&target, bytes).await?;
        debug!(path = %target.display(), bytes = bytes.len(), "wrote resource");
        Ok(target)
    }

    /// Keeps the original bytes of a document under their content hash
    pub async fn store_original(&self, hash: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.originals.join(hash);
        if fs::try_exists(&target).await? {
            return Ok(());
        }
        write_atomic(&target, bytes).await
    }

    /// Loads original bytes by content hash, None if they are gone
    pub async fn load_original(&self, hash: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.originals.join(hash)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns true if a stored resource file is present
    pub async fn exists(&self, local_path: &str) -> bool {
        match self.resolve(local_path) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

async fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
    })?;
    fs::create_dir_all(parent).await?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.part", file_name, rand::random::<u32>()));

    let result = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&temp, target).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&temp).await;
    }
    result
}
