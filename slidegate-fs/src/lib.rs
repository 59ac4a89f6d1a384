//! Filesystem document store for `slidegate` (companion crate).
//! One JSON document per client under a directory; bring your own path.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use slidegate::{ClientRateRecord, DocumentStore};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Errors raised by [`FsStore`].
#[derive(Debug, thiserror::Error)]
pub enum FsStoreError {
    #[error("fs store io: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable store keeping `{"actions": [...]}` documents, one file per client.
///
/// Client identifiers are hex-encoded into file names so any string (empty,
/// containing `/`, `..`, NUL) maps to a distinct, safe file. Identifiers longer
/// than 100 bytes are named by their length and SHA-256 digest instead, which
/// keeps every name well under common file name limits. Writes go to a
/// uniquely named temporary file that is renamed over the target, so readers
/// see either the old or the new document.
///
/// There is no cross-process locking; concurrent writers for one client follow
/// last-rename-wins, matching the limiter's overwrite semantics.
#[derive(Clone, Debug)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Use `dir` as-is; it must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `dir` (and parents) if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FsStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the record for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

/// Keys up to this many bytes keep a reversible hex file name.
const MAX_HEX_KEY_LEN: usize = 100;

fn file_name(key: &str) -> String {
    if key.len() > MAX_HEX_KEY_LEN {
        // Hashed names contain non-hex characters, so they never collide with hex names.
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        return format!("client-sha256-{}-{:x}.json", key.len(), hasher.finalize());
    }
    let mut name = String::with_capacity(key.len() * 2 + 12);
    name.push_str("client-");
    for byte in key.as_bytes() {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(".json");
    name
}

#[async_trait]
impl DocumentStore for FsStore {
    type Error = FsStoreError;

    async fn get(&self, key: &str) -> Result<Option<ClientRateRecord>, Self::Error> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| FsStoreError::Corrupt { path, source })
    }

    async fn set(&self, key: &str, record: &ClientRateRecord) -> Result<(), Self::Error> {
        let path = self.path_for(key);
        let body = serde_json::to_vec(record)
            .map_err(|source| FsStoreError::Corrupt { path: path.clone(), source })?;

        let tmp = self.dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(
                target: "slidegate::fs",
                path = %path.display(),
                error = %e,
                "failed to persist client record"
            );
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_hex_encoded() {
        assert_eq!(file_name("c1"), "client-6331.json");
        assert_eq!(file_name(""), "client-.json");
        assert_eq!(file_name("../x"), "client-2e2e2f78.json");
    }

    #[test]
    fn distinct_keys_get_distinct_files() {
        assert_ne!(file_name("C1"), file_name("c1"));
        assert_ne!(file_name("c1 "), file_name("c1"));
    }

    #[test]
    fn long_keys_get_bounded_names() {
        let short = "x".repeat(MAX_HEX_KEY_LEN);
        assert_eq!(file_name(&short).len(), 2 * MAX_HEX_KEY_LEN + 12);

        let long = "x".repeat(MAX_HEX_KEY_LEN + 1);
        let name = file_name(&long);
        assert!(name.starts_with("client-sha256-101-"));
        assert!(name.len() < 100, "{name}");
        assert_eq!(file_name(&"x".repeat(100_000)).len(), name.len() + 3);
        assert_ne!(file_name(&long), file_name(&"y".repeat(MAX_HEX_KEY_LEN + 1)));
    }
}
