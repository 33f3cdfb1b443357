use crate::{error::ProgressStoreError, state::ProgressStore};
use async_trait::async_trait;
use model::job::JobItemProgress;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledProgressStore {
    db: sled::Db,
}

impl SledProgressStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProgressStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn job_prefix(job_id: &str) -> String {
        format!("progress:{}:", job_id)
    }

    #[inline]
    fn progress_key(job_id: &str, sharding_item: u32) -> String {
        format!("progress:{}:{}", job_id, sharding_item)
    }
}

#[async_trait]
impl ProgressStore for SledProgressStore {
    async fn save_progress(&self, progress: &JobItemProgress) -> Result<(), ProgressStoreError> {
        let key = Self::progress_key(&progress.job_id, progress.sharding_item);

        // Read-merge-write in one transaction so two writers racing on the
        // same item cannot drop a finished position.
        let result = self.db.transaction::<_, _, ProgressStoreError>(|tx_db| {
            let mut next = progress.clone();
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: JobItemProgress = bincode::deserialize(&existing_bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(ProgressStoreError::from(e)))?;
                next.merge_finished(&existing);
            }

            let bytes = bincode::serialize(&next)
                .map_err(|e| ConflictableTransactionError::Abort(ProgressStoreError::from(e)))?;
            tx_db.insert(key.as_bytes(), bytes)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                debug!(
                    job_id = %progress.job_id,
                    sharding_item = progress.sharding_item,
                    status = %progress.status,
                    "Saved job item progress"
                );
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(ProgressStoreError::Save {
                job_id: progress.job_id.clone(),
                sharding_item: progress.sharding_item,
                message: e.to_string(),
            }),
        }
    }

    async fn load_progress(
        &self,
        job_id: &str,
        sharding_item: u32,
    ) -> Result<Option<JobItemProgress>, ProgressStoreError> {
        let key = Self::progress_key(job_id, sharding_item);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_items(&self, job_id: &str) -> Result<Vec<u32>, ProgressStoreError> {
        let prefix = Self::job_prefix(job_id);
        let mut items = Vec::new();

        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let item = std::str::from_utf8(&key)
                .ok()
                .and_then(|k| k.strip_prefix(prefix.as_str()))
                .and_then(|suffix| suffix.parse::<u32>().ok());
            if let Some(item) = item {
                items.push(item);
            }
        }

        items.sort_unstable();
        Ok(items)
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), ProgressStoreError> {
        let prefix = Self::job_prefix(job_id);
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            self.db.remove(key)?;
        }
        self.db.flush_async().await?;
        Ok(())
    }
}
