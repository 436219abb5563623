//! Local fallback copy of the plan list.
//!
//! The whole list lives under one fixed key and is always read and written
//! wholesale. Read-modify-write cycles are serialized by an in-process lock
//! so a delete racing a create cannot drop either change.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PlannerError;
use crate::models::TravelPlan;

pub const CACHE_KEY: &str = "travelPlans";

/// Raw key/value storage behind the cache.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, PlannerError>;
    async fn write(&self, key: &str, contents: &str) -> Result<(), PlannerError>;
    async fn remove(&self, key: &str) -> Result<(), PlannerError>;
}

/// One JSON file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, PlannerError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                Err(PlannerError::CacheCorruption(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), PlannerError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let staging = self.dir.join(format!("{}.json.tmp", key));
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PlannerError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// In-process storage, for tests and for running without a writable disk.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, PlannerError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), PlannerError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PlannerError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

pub struct LocalPlanCache {
    storage: Box<dyn CacheStorage>,
    lock: Mutex<()>,
}

impl LocalPlanCache {
    pub fn new(storage: impl CacheStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::default())
    }

    /// Every valid cached plan. Corrupt contents are discarded and read as
    /// an empty list; individual invalid records are dropped.
    pub async fn load(&self) -> Vec<TravelPlan> {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Replaces every cached plan owned by `user_id` with `plans`, keeping
    /// other owners' plans. `None` replaces the whole list.
    pub async fn replace_owned(
        &self,
        user_id: Option<&str>,
        plans: &[TravelPlan],
    ) -> Result<(), PlannerError> {
        let _guard = self.lock.lock().await;
        let mut kept = match user_id {
            Some(user_id) => self
                .load_unlocked()
                .await
                .into_iter()
                .filter(|cached| cached.user_id.as_deref() != Some(user_id))
                .collect(),
            None => Vec::new(),
        };

        let mut merged = plans.to_vec();
        merged.append(&mut kept);
        self.save_unlocked(&merged).await
    }

    /// Puts `plan` first, replacing any cached copy with the same id.
    pub async fn upsert(&self, plan: &TravelPlan) -> Result<(), PlannerError> {
        let _guard = self.lock.lock().await;
        let mut plans = self.load_unlocked().await;
        plans.retain(|cached| cached.id != plan.id);
        plans.insert(0, plan.clone());
        self.save_unlocked(&plans).await
    }

    /// Runs `change` on the cached plan with `id`; returns the changed copy,
    /// or `None` when the plan is not cached. The change is kept only if
    /// the result is still a valid plan.
    pub async fn modify<F>(&self, id: &str, change: F) -> Result<Option<TravelPlan>, PlannerError>
    where
        F: FnOnce(&mut TravelPlan) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut plans = self.load_unlocked().await;

        let Some(position) = plans.iter().position(|plan| plan.id == id) else {
            return Ok(None);
        };

        let mut updated = plans[position].clone();
        change(&mut updated);
        updated.validate()?;

        plans[position] = updated.clone();
        self.save_unlocked(&plans).await?;
        Ok(Some(updated))
    }

    /// Removes the plan with `id`; true when something was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, PlannerError> {
        let _guard = self.lock.lock().await;
        let mut plans = self.load_unlocked().await;
        let before = plans.len();
        plans.retain(|plan| plan.id != id);

        if plans.len() == before {
            return Ok(false);
        }
        self.save_unlocked(&plans).await?;
        Ok(true)
    }

    async fn load_unlocked(&self) -> Vec<TravelPlan> {
        let raw = match self.storage.read(CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                log::error!("Failed to read local plan cache: {}", err);
                return Vec::new();
            }
        };

        match decode_plans(&raw) {
            Ok(plans) => plans,
            Err(err) => {
                log::warn!("{}; discarding cached data", err);
                if let Err(remove_err) = self.storage.remove(CACHE_KEY).await {
                    log::error!("Failed to discard corrupt plan cache: {}", remove_err);
                }
                Vec::new()
            }
        }
    }

    async fn save_unlocked(&self, plans: &[TravelPlan]) -> Result<(), PlannerError> {
        let contents = serde_json::to_string(plans)
            .map_err(|e| PlannerError::CacheCorruption(format!("failed to encode plans: {}", e)))?;
        self.storage.write(CACHE_KEY, &contents).await
    }
}

/// Parses the cached list. Only a non-list blob counts as corruption;
/// records that fail to decode or validate are skipped.
pub fn decode_plans(raw: &str) -> Result<Vec<TravelPlan>, PlannerError> {
    let records: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| PlannerError::CacheCorruption(e.to_string()))?;

    let mut plans = Vec::with_capacity(records.len());
    for record in records {
        let plan: TravelPlan = match serde_json::from_value(record) {
            Ok(plan) => plan,
            Err(err) => {
                log::warn!("Skipping undecodable cached plan: {}", err);
                continue;
            }
        };
        match plan.validate() {
            Ok(()) => plans.push(plan),
            Err(err) => log::warn!("Skipping invalid cached plan {}: {}", plan.id, err),
        }
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sample_plans::sample_plans;
    use tokio_test::block_on;

    #[test]
    fn test_upsert_puts_newest_first_and_replaces() {
        block_on(async {
            let cache = LocalPlanCache::in_memory();
            let plans = sample_plans(None);

            cache.upsert(&plans[0]).await.unwrap();
            cache.upsert(&plans[1]).await.unwrap();
            let loaded = cache.load().await;
            assert_eq!(loaded[0].id, plans[1].id);
            assert_eq!(loaded.len(), 2);

            let mut changed = plans[0].clone();
            changed.title = "Renamed".to_string();
            cache.upsert(&changed).await.unwrap();
            let loaded = cache.load().await;
            assert_eq!(loaded.len(), 2);
            assert_eq!(loaded[0].title, "Renamed");
        });
    }

    #[test]
    fn test_corrupt_cache_reads_as_empty_and_is_discarded() {
        block_on(async {
            let storage = MemoryStorage::default();
            storage.write(CACHE_KEY, "{not json").await.unwrap();
            let cache = LocalPlanCache::new(storage);

            assert!(cache.load().await.is_empty());
            assert!(cache.storage.read(CACHE_KEY).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_invalid_records_are_dropped_individually() {
        let plans = sample_plans(None);
        let mut broken = serde_json::to_value(&plans[0]).unwrap();
        broken["title"] = serde_json::json!("");
        let raw = serde_json::to_string(&vec![
            broken,
            serde_json::json!({"id": 7}),
            serde_json::to_value(&plans[1]).unwrap(),
        ])
        .unwrap();

        let decoded = decode_plans(&raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, plans[1].id);
    }

    #[test]
    fn test_modify_and_remove() {
        block_on(async {
            let cache = LocalPlanCache::in_memory();
            let plans = sample_plans(None);
            cache.replace_owned(None, &plans).await.unwrap();

            let updated = cache
                .modify(&plans[0].id, |plan| plan.title = "Shanghai weekend".to_string())
                .await
                .unwrap();
            assert_eq!(updated.unwrap().title, "Shanghai weekend");

            let rejected = cache
                .modify(&plans[0].id, |plan| plan.title = String::new())
                .await;
            assert!(matches!(rejected, Err(PlannerError::Validation(_))));

            assert!(cache.modify("missing", |_| {}).await.unwrap().is_none());
            assert!(cache.remove(&plans[0].id).await.unwrap());
            assert!(!cache.remove(&plans[0].id).await.unwrap());
            assert_eq!(cache.load().await.len(), plans.len() - 1);
        });
    }

    #[test]
    fn test_replace_owned_keeps_other_users() {
        block_on(async {
            let cache = LocalPlanCache::in_memory();
            let mine = sample_plans(Some("u1"));
            let mut theirs = sample_plans(Some("u2"));
            for plan in &mut theirs {
                plan.id = TravelPlan::new_id();
            }
            cache
                .replace_owned(None, &[mine.clone(), theirs.clone()].concat())
                .await
                .unwrap();

            cache.replace_owned(Some("u1"), &mine[..1]).await.unwrap();
            let loaded = cache.load().await;
            assert_eq!(loaded.len(), 3);
            assert_eq!(loaded[0].id, mine[0].id);
            assert_eq!(
                loaded.iter().filter(|p| p.user_id.as_deref() == Some("u2")).count(),
                2
            );

            cache.replace_owned(None, &[]).await.unwrap();
            assert!(cache.load().await.is_empty());
        });
    }

    #[actix_rt::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalPlanCache::new(FileStorage::new(dir.path().join("cache")));
        let plans = sample_plans(Some("user-1"));

        assert!(cache.load().await.is_empty());
        cache.replace_owned(None, &plans).await.unwrap();
        assert!(dir.path().join("cache").join("travelPlans.json").exists());
        assert_eq!(cache.load().await, plans);
    }
}
