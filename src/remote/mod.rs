//! Remote object storage for disaster-recovery reconciliation.
//!
//! One named bucket holds archive objects keyed by file name. The trait
//! exists so the reconciliation engine can be tested against an in-memory
//! bucket.

pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote storage error: {0}")]
    Api(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Identity of the remote bucket. Both fields are required before any
/// reconciliation may run.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub bucket: String,
    pub region: String,
}

#[async_trait]
pub trait RemoteBucket: Send + Sync {
    /// Make the bucket exist: no-op if present, provision it otherwise.
    async fn ensure_bucket(&self) -> Result<()>;

    async fn object_exists(&self, name: &str) -> Result<bool>;

    /// Upload the file at `path` under its base name.
    async fn upload(&self, path: &Path) -> Result<()>;

    /// Download object `name` to `dest`, returning the bytes written.
    async fn download(&self, name: &str, dest: &Path) -> Result<u64>;

    /// Names of every object in the bucket.
    async fn list(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
pub mod memory {
    //! In-memory bucket for engine tests.

    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryBucket {
        pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
        pub provisioned: AtomicBool,
        pub fail_transfers: AtomicBool,
    }

    impl MemoryBucket {
        pub fn with_object(name: &str, data: &[u8]) -> Self {
            let bucket = Self::default();
            bucket
                .objects
                .lock()
                .unwrap()
                .insert(name.to_string(), data.to_vec());
            bucket
        }
    }

    #[async_trait]
    impl RemoteBucket for MemoryBucket {
        async fn ensure_bucket(&self) -> Result<()> {
            self.provisioned.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn object_exists(&self, name: &str) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(name))
        }

        async fn upload(&self, path: &Path) -> Result<()> {
            if self.fail_transfers.load(Ordering::SeqCst) {
                return Err(RemoteError::Api("injected transfer failure".into()));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| RemoteError::Api("upload path has no file name".into()))?;
            let data = std::fs::read(path)?;
            self.objects.lock().unwrap().insert(name, data);
            Ok(())
        }

        async fn download(&self, name: &str, dest: &Path) -> Result<u64> {
            if self.fail_transfers.load(Ordering::SeqCst) {
                return Err(RemoteError::Api("injected transfer failure".into()));
            }
            let data = self
                .objects
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            std::fs::write(dest, &data)?;
            Ok(data.len() as u64)
        }

        async fn list(&self) -> Result<Vec<String>> {
            Ok(self.objects.lock().unwrap().keys().cloned().collect())
        }
    }
}
