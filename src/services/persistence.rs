//! Remote-first persistence with a local cache and sample fallback.
//!
//! Reads never fail: the remote store, the local cache and the fixed sample
//! plans are tried in order and the first non-empty answer wins. Writes go to
//! the remote store when it is reachable and always land in the cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::PlannerError;
use crate::models::{PlanUpdate, TravelPlan};
use crate::services::local_cache::LocalPlanCache;
use crate::services::plan_store::RemotePlanStore;
use crate::services::sample_plans::sample_plans;

/// One tier of the list fallback chain.
#[async_trait]
pub trait ReadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Valid plans for `user_id`, newest first. An empty list lets the next
    /// tier answer.
    async fn read(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError>;
}

/// Drops records that fail validation, logging each one.
fn keep_valid(source: &str, plans: Vec<TravelPlan>) -> Vec<TravelPlan> {
    plans
        .into_iter()
        .filter(|plan| match plan.validate() {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Dropping invalid {} plan {}: {}", source, plan.id, err);
                false
            }
        })
        .collect()
}

/// Reads the remote store and refreshes the cache with a non-empty answer.
/// A store that does not answer within `timeout` counts as a failed read.
pub struct RemoteRead {
    store: Arc<dyn RemotePlanStore>,
    cache: Arc<LocalPlanCache>,
    timeout: Duration,
}

impl RemoteRead {
    pub fn new(
        store: Arc<dyn RemotePlanStore>,
        cache: Arc<LocalPlanCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            timeout,
        }
    }
}

#[async_trait]
impl ReadStrategy for RemoteRead {
    fn name(&self) -> &'static str {
        "remote store"
    }

    async fn read(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError> {
        let listed = tokio::time::timeout(self.timeout, self.store.list(user_id))
            .await
            .map_err(|_| PlannerError::TimedOut(self.timeout))??;
        let plans = keep_valid("remote", listed);

        if !plans.is_empty() {
            if let Err(err) = self.cache.replace_owned(user_id, &plans).await {
                log::error!("Failed to refresh local plan cache: {}", err);
            }
        }
        Ok(plans)
    }
}

pub struct CacheRead {
    cache: Arc<LocalPlanCache>,
}

impl CacheRead {
    pub fn new(cache: Arc<LocalPlanCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ReadStrategy for CacheRead {
    fn name(&self) -> &'static str {
        "local cache"
    }

    async fn read(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError> {
        let mut plans: Vec<TravelPlan> = self
            .cache
            .load()
            .await
            .into_iter()
            .filter(|plan| user_id.is_none() || plan.user_id.as_deref() == user_id)
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }
}

pub struct SampleRead;

#[async_trait]
impl ReadStrategy for SampleRead {
    fn name(&self) -> &'static str {
        "sample plans"
    }

    async fn read(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError> {
        Ok(sample_plans(user_id))
    }
}

pub struct PersistenceCoordinator {
    store: Arc<dyn RemotePlanStore>,
    cache: Arc<LocalPlanCache>,
    strategies: Vec<Box<dyn ReadStrategy>>,
}

impl PersistenceCoordinator {
    /// Coordinator with the standard remote, cache, samples chain. Remote
    /// reads slower than `remote_timeout` fall through to the cache.
    pub fn new(
        store: Arc<dyn RemotePlanStore>,
        cache: Arc<LocalPlanCache>,
        remote_timeout: Duration,
    ) -> Self {
        let strategies: Vec<Box<dyn ReadStrategy>> = vec![
            Box::new(RemoteRead::new(store.clone(), cache.clone(), remote_timeout)),
            Box::new(CacheRead::new(cache.clone())),
            Box::new(SampleRead),
        ];
        Self::with_strategies(store, cache, strategies)
    }

    pub fn with_strategies(
        store: Arc<dyn RemotePlanStore>,
        cache: Arc<LocalPlanCache>,
        strategies: Vec<Box<dyn ReadStrategy>>,
    ) -> Self {
        Self {
            store,
            cache,
            strategies,
        }
    }

    pub fn cache(&self) -> &Arc<LocalPlanCache> {
        &self.cache
    }

    /// Stores a freshly generated plan. An unreachable remote store is
    /// logged and the local plan is returned as stored.
    pub async fn create(&self, plan: TravelPlan) -> Result<TravelPlan, PlannerError> {
        plan.validate()?;

        match self.store.insert(&plan).await {
            Ok(_) => log::info!("Stored plan {} remotely", plan.id),
            Err(err) => log::warn!(
                "Remote store unavailable, keeping plan {} locally: {}",
                plan.id,
                err
            ),
        }

        if let Err(err) = self.cache.upsert(&plan).await {
            log::error!("Failed to cache plan {}: {}", plan.id, err);
        }

        Ok(plan)
    }

    /// Plans of `user_id`, newest first. Never fails.
    pub async fn list(&self, user_id: Option<&str>) -> Vec<TravelPlan> {
        for strategy in &self.strategies {
            match strategy.read(user_id).await {
                Ok(plans) if !plans.is_empty() => {
                    log::debug!("Listed {} plans from {}", plans.len(), strategy.name());
                    return plans;
                }
                Ok(_) => log::debug!("{} has no plans, trying next source", strategy.name()),
                Err(err) => log::warn!("Reading plans from {} failed: {}", strategy.name(), err),
            }
        }
        Vec::new()
    }

    /// Writes the present fields remotely and to the cache. Not found only
    /// when neither copy knows `id`.
    pub async fn update(&self, id: &str, update: &PlanUpdate) -> Result<TravelPlan, PlannerError> {
        update.validate()?;
        let now = Utc::now();

        let remote = match self.store.update(id, update, now).await {
            Ok(updated) => updated,
            Err(err) => {
                log::warn!("Remote update of plan {} failed: {}", id, err);
                None
            }
        };

        let cached = self
            .cache
            .modify(id, |plan| update.apply_to(plan, now))
            .await
            .unwrap_or_else(|err| {
                log::error!("Failed to update cached plan {}: {}", id, err);
                None
            });

        match (remote, cached) {
            (Some(remote), _) => {
                if let Err(err) = remote.validate() {
                    log::warn!("Remote copy of plan {} is invalid after update: {}", id, err);
                }
                Ok(remote)
            }
            (None, Some(cached)) => Ok(cached),
            (None, None) => Err(PlannerError::NotFound(format!("plan {}", id))),
        }
    }

    /// Best-effort delete. Always clears the cached copy and never fails.
    pub async fn delete(&self, id: &str) {
        match self.store.delete(id).await {
            Ok(true) => log::info!("Deleted plan {} remotely", id),
            Ok(false) => log::debug!("Plan {} was not in the remote store", id),
            Err(err) => log::warn!("Remote delete of plan {} failed: {}", id, err),
        }

        if let Err(err) = self.cache.remove(id).await {
            log::error!("Failed to remove cached plan {}: {}", id, err);
        }
    }
}
