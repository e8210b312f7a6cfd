//! Baseline store: named reference buffers with per-name write locking

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use crate::blob::{BlobStore, Namespace};
use crate::error::{Result, VisregError};
use crate::name::TestName;
use crate::pixel::{CaptureFormat, PixelBuffer};

/// What a writer does when the baseline is held by another operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Queue behind the current holder
    #[default]
    Wait,
    /// Fail with `BaselineWriteConflict` while any reader or writer holds the name
    FailFast,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStoreOptions {
    pub write_policy: WritePolicy,
}

/// Metadata persisted next to every baseline image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineMetadata {
    pub name: TestName,
    pub width: u32,
    pub height: u32,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored reference buffer
#[derive(Debug, Clone)]
pub struct Baseline {
    pub name: TestName,
    pub buffer: PixelBuffer,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`BaselineStore::get_or_create`]
#[derive(Debug, Clone)]
pub struct Resolved {
    pub buffer: PixelBuffer,
    /// True when the supplied buffer was just persisted as the new baseline
    pub created: bool,
}

/// Exclusive hold on one baseline name, released on drop
pub struct BaselineLock {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Persists and retrieves baselines.
///
/// Images are stored under a content-addressed key,
/// `baseline/<name>/<digest>.png`. The metadata blob `baseline/<name>.json`
/// names the current digest and is written last, so a baseline only changes
/// once its metadata lands. A failed write leaves the previous baseline in
/// place.
///
/// Operations on one name are serialized through a reader/writer lock.
/// Different names never contend.
pub struct BaselineStore<S> {
    blobs: Arc<S>,
    locks: DashMap<TestName, Arc<RwLock<()>>>,
    options: BaselineStoreOptions,
}

impl<S: BlobStore> BaselineStore<S> {
    pub fn new(blobs: Arc<S>) -> Self {
        Self::with_options(blobs, BaselineStoreOptions::default())
    }

    pub fn with_options(blobs: Arc<S>, options: BaselineStoreOptions) -> Self {
        Self {
            blobs,
            locks: DashMap::new(),
            options,
        }
    }

    pub fn blobs(&self) -> &Arc<S> {
        &self.blobs
    }

    /// Take the write lock for `name`, honouring the write policy
    pub async fn lock(&self, name: &TestName) -> Result<BaselineLock> {
        let lock = self.lock_for(name);
        let guard = match self.options.write_policy {
            WritePolicy::Wait => lock.write_owned().await,
            WritePolicy::FailFast => {
                lock.try_write_owned()
                    .map_err(|_| VisregError::BaselineWriteConflict {
                        name: name.to_string(),
                    })?
            }
        };
        Ok(BaselineLock { _guard: guard })
    }

    /// Return the stored baseline, or persist `current` as the baseline if none exists
    pub async fn get_or_create(&self, name: &TestName, current: &PixelBuffer) -> Result<Resolved> {
        let lock = self.lock(name).await?;
        self.get_or_create_locked(&lock, name, current).await
    }

    pub(crate) async fn get_or_create_locked(
        &self,
        _lock: &BaselineLock,
        name: &TestName,
        current: &PixelBuffer,
    ) -> Result<Resolved> {
        if let Some(baseline) = self.read_baseline(name).await? {
            debug!("Resolved existing baseline '{}'", name);
            return Ok(Resolved {
                buffer: baseline.buffer,
                created: false,
            });
        }

        self.write(name, current, None).await?;
        info!("Created baseline for '{}' from current capture", name);
        Ok(Resolved {
            buffer: current.clone(),
            created: true,
        })
    }

    /// Create or replace the baseline for `name`
    pub async fn update(&self, name: &TestName, buffer: &PixelBuffer) -> Result<Baseline> {
        let _lock = self.lock(name).await?;

        let previous = self.read_metadata(name).await?;
        let metadata = self.write(name, buffer, previous.map(|m| m.created_at)).await?;
        info!("Updated baseline for '{}'", name);

        Ok(Baseline {
            name: name.clone(),
            buffer: buffer.clone(),
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
        })
    }

    /// Stored buffer for `name`, if any
    pub async fn get(&self, name: &TestName) -> Result<Option<PixelBuffer>> {
        Ok(self.load(name).await?.map(|b| b.buffer))
    }

    /// Stored baseline with its timestamps, if any
    pub async fn load(&self, name: &TestName) -> Result<Option<Baseline>> {
        let _guard = self.read_guard(name).await;
        self.read_baseline(name).await
    }

    /// Metadata for `name`, if any
    pub async fn metadata(&self, name: &TestName) -> Result<Option<BaselineMetadata>> {
        let _guard = self.read_guard(name).await;
        self.read_metadata(name).await
    }

    /// Names of all stored baselines
    pub async fn list(&self) -> Result<BTreeSet<TestName>> {
        let prefix = Namespace::Baseline.prefix();
        let keys = self.blobs.list_keys(&prefix).await?;

        let names = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.strip_suffix(".json"))
            .filter(|stem| !stem.contains('/'))
            .filter_map(|stem| match TestName::parse(stem) {
                Ok(name) => Some(name),
                Err(e) => {
                    debug!("Ignoring foreign baseline key: {}", e);
                    None
                }
            })
            .collect();

        Ok(names)
    }

    /// Metadata of every stored baseline, ordered by name
    pub async fn list_metadata(&self) -> Result<Vec<BaselineMetadata>> {
        let mut all = Vec::new();
        for name in self.list().await? {
            // Deleted since listing
            if let Some(meta) = self.metadata(&name).await? {
                all.push(meta);
            }
        }
        Ok(all)
    }

    /// Delete the baseline for `name`
    pub async fn delete(&self, name: &TestName) -> Result<()> {
        let lock = self.lock(name).await?;
        let result = self.delete_locked(&lock, name).await;
        drop(lock);
        self.release(name);
        result
    }

    pub(crate) async fn delete_locked(&self, _lock: &BaselineLock, name: &TestName) -> Result<()> {
        let existed = self
            .blobs
            .delete_blob(&Namespace::Baseline.metadata_key(name))
            .await?;
        self.prune_images(name, None).await?;

        if !existed {
            return Err(VisregError::BaselineNotFound(name.to_string()));
        }

        info!("Deleted baseline '{}'", name);
        Ok(())
    }

    /// Drop the lock entry for `name` once nobody else holds or awaits it
    pub(crate) fn release(&self, name: &TestName) {
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn lock_for(&self, name: &TestName) -> Arc<RwLock<()>> {
        Arc::clone(&self.locks.entry(name.clone()).or_default())
    }

    async fn read_guard(&self, name: &TestName) -> OwnedRwLockReadGuard<()> {
        self.lock_for(name).read_owned().await
    }

    async fn read_baseline(&self, name: &TestName) -> Result<Option<Baseline>> {
        let Some(meta) = self.read_metadata(name).await? else {
            return Ok(None);
        };

        let key = Namespace::Baseline.content_key(name, &meta.digest);
        let bytes = self.blobs.read_blob(&key).await?.ok_or_else(|| {
            VisregError::InvalidBuffer(format!("baseline '{}' image {} is missing", name, key))
        })?;

        let buffer = PixelBuffer::decode(&bytes).map_err(|e| e.for_test(name.as_str()))?;
        let digest = buffer.digest();
        if meta.digest != digest {
            return Err(VisregError::InvalidBuffer(format!(
                "baseline '{}' digest mismatch: expected {}, got {}",
                name, meta.digest, digest
            )));
        }

        Ok(Some(Baseline {
            name: name.clone(),
            buffer,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        }))
    }

    async fn read_metadata(&self, name: &TestName) -> Result<Option<BaselineMetadata>> {
        match self
            .blobs
            .read_blob(&Namespace::Baseline.metadata_key(name))
            .await?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        name: &TestName,
        buffer: &PixelBuffer,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<BaselineMetadata> {
        let now = Utc::now();
        let metadata = BaselineMetadata {
            name: name.clone(),
            width: buffer.width(),
            height: buffer.height(),
            digest: buffer.digest(),
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        };

        let image_key = Namespace::Baseline.content_key(name, &metadata.digest);
        let png = buffer.encode(&CaptureFormat::png())?;
        self.blobs.write_blob(&image_key, &png).await?;

        // Commit point
        self.blobs
            .write_blob(
                &Namespace::Baseline.metadata_key(name),
                &serde_json::to_vec_pretty(&metadata)?,
            )
            .await?;

        if let Err(e) = self.prune_images(name, Some(&image_key)).await {
            warn!("Failed to remove superseded images of '{}': {}", name, e);
        }

        Ok(metadata)
    }

    /// Delete every image of `name` except `keep`
    async fn prune_images(&self, name: &TestName, keep: Option<&str>) -> Result<()> {
        let prefix = Namespace::Baseline.content_prefix(name);
        for key in self.blobs.list_keys(&prefix).await? {
            if Some(key.as_str()) != keep {
                self.blobs.delete_blob(&key).await?;
                debug!("Removed image {}", key);
            }
        }
        Ok(())
    }
}
