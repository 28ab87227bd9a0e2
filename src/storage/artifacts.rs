//! Model artifact files
//!
//! Artifacts are JSON files under one directory, addressed by a relative
//! path recorded in the registry together with their SHA-256. Loading
//! verifies the digest. Loaded artifacts are cached for the rest of the
//! run; a registered file never changes, so the cache is never stale.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BotError, Result};
use crate::ml::ModelArtifact;
use crate::types::ModelRegistryEntry;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Where a stored artifact landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Relative to the artifact directory
    pub file_path: String,
    pub digest: String,
}

pub struct ArtifactStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<ModelArtifact>>>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn relative_path(artifact: &ModelArtifact) -> String {
        format!(
            "{}_{}/{}.json",
            artifact.station.region.as_str().to_lowercase(),
            artifact.station.slug(),
            artifact.version
        )
    }

    pub async fn save(&self, artifact: &ModelArtifact) -> Result<StoredArtifact> {
        let file_path = Self::relative_path(artifact);
        let full = self.dir.join(&file_path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(artifact)?;
        tokio::fs::write(&full, &bytes).await?;
        tracing::debug!("Wrote model artifact {} ({} bytes)", full.display(), bytes.len());

        Ok(StoredArtifact {
            file_path,
            digest: sha256_hex(&bytes),
        })
    }

    /// Load the artifact of a registry entry, checking its digest
    pub async fn load(&self, entry: &ModelRegistryEntry) -> Result<Arc<ModelArtifact>> {
        if let Some(cached) = self.cache.lock().get(&entry.file_path) {
            return Ok(Arc::clone(cached));
        }

        let full = self.dir.join(&entry.file_path);
        let bytes = tokio::fs::read(&full).await.map_err(|e| {
            BotError::Artifact(format!("cannot read {}: {}", full.display(), e))
        })?;

        let digest = sha256_hex(&bytes);
        if digest != entry.digest {
            return Err(BotError::Integrity(format!(
                "artifact {} digest {} does not match registry {}",
                entry.file_path, digest, entry.digest
            )));
        }

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| BotError::Artifact(format!("{}: {}", entry.file_path, e)))?;
        artifact.check_features()?;
        if artifact.version != entry.version {
            return Err(BotError::Integrity(format!(
                "artifact {} holds version {}, registry says {}",
                entry.file_path, artifact.version, entry.version
            )));
        }

        let artifact = Arc::new(artifact);
        self.cache
            .lock()
            .insert(entry.file_path.clone(), Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Remove an artifact file; `false` if it was already gone
    pub async fn delete(&self, file_path: &str) -> Result<bool> {
        self.cache.lock().remove(file_path);
        match tokio::fs::remove_file(self.dir.join(file_path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}
