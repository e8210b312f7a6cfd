//! Blob storage for baselines and comparison artifacts
//!
//! Keys are `/`-separated relative paths such as `current/home.png`. The
//! engine only relies on the logical namespaces in [`Namespace`]; how keys
//! map onto physical storage is up to the [`BlobStore`] implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, VisregError};
use crate::name::TestName;

/// Logical namespace of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Baseline,
    Current,
    Diff,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Baseline => "baseline",
            Namespace::Current => "current",
            Namespace::Diff => "diff",
        }
    }

    /// Prefix under which every key of this namespace lives
    pub fn prefix(&self) -> String {
        format!("{}/", self.as_str())
    }

    /// Key of the PNG image for `name`
    pub fn image_key(&self, name: &TestName) -> String {
        format!("{}/{}.png", self.as_str(), name)
    }

    /// Key of the JSON metadata for `name`
    pub fn metadata_key(&self, name: &TestName) -> String {
        format!("{}/{}.json", self.as_str(), name)
    }

    /// Prefix holding the content-addressed images of `name`
    pub fn content_prefix(&self, name: &TestName) -> String {
        format!("{}/{}/", self.as_str(), name)
    }

    /// Key of the PNG image of `name` whose digest is `digest`
    pub fn content_key(&self, name: &TestName, digest: &str) -> String {
        format!("{}{}.png", self.content_prefix(name), digest)
    }
}

/// Persistent store for named binary blobs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob, `None` if the key does not exist
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace a blob
    async fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// All keys starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a blob, returning whether it existed
    async fn delete_blob(&self, key: &str) -> Result<bool>;
}

/// In-memory blob store, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_blob(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.write().await.remove(key).is_some())
    }
}

/// Blob store backed by a directory tree.
///
/// Writes go to a temp file first and are renamed into place, so readers
/// never see a partially written blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let key = root.display().to_string();

        fs::create_dir_all(root.join("tmp"))
            .await
            .map_err(|e| VisregError::storage("create store", &key, e))?;

        info!("Initialized blob store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with("tmp/")
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'));
        if !valid {
            return Err(VisregError::InvalidRequest(format!("invalid blob key: {}", key)));
        }
        Ok(self.root.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VisregError::storage("read", key, e)),
        }
    }

    async fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VisregError::storage("write", key, e))?;
        }

        // Unique temp name so concurrent writers of different keys never collide
        let tmp = tempfile::Builder::new()
            .prefix("blob-")
            .tempfile_in(self.root.join("tmp"))
            .map_err(|e| VisregError::storage("write", key, e))?
            .into_temp_path();

        fs::write(&tmp, bytes)
            .await
            .map_err(|e| VisregError::storage("write", key, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| VisregError::storage("write", key, e))?;
        // Already renamed away, nothing left to clean up
        let _ = tmp.keep();

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // Walk only the directory containing the prefix
        let dir = match prefix.rfind('/') {
            Some(idx) => self.root.join(&prefix[..idx]),
            None => self.root.clone(),
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let tmp_dir = self.root.join("tmp");
        let mut keys: Vec<String> = walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && !e.path().starts_with(&tmp_dir))
            .filter_map(|e| self.key_for(e.path()))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_blob(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VisregError::storage("delete", key, e)),
        }
    }
}
