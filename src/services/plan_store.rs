use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::PlannerError;
use crate::models::expense::{from_bson_datetime, to_bson_datetime};
use crate::models::{DailyItinerary, PlanStatus, PlanUpdate, TravelPlan, TravelPreference};

pub const PLANS_COLLECTION: &str = "travel_plans";

/// System of record for plans.
#[async_trait]
pub trait RemotePlanStore: Send + Sync {
    async fn insert(&self, plan: &TravelPlan) -> Result<TravelPlan, PlannerError>;

    /// Plans of `user_id` (all plans when `None`), newest first. Rows that
    /// cannot be decoded are skipped.
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError>;

    /// `Ok(None)` when no plan has this id.
    async fn update(
        &self,
        id: &str,
        update: &PlanUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<TravelPlan>, PlannerError>;

    /// True when a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, PlannerError>;

    async fn ping(&self) -> Result<(), PlannerError>;
}

/// Row layout of the `travel_plans` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub preferences: TravelPreference,
    #[serde(default)]
    pub daily_itineraries: Vec<DailyItinerary>,
    pub total_budget: f64,
    pub spent_budget: f64,
    pub status: PlanStatus,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl From<&TravelPlan> for PlanRecord {
    fn from(plan: &TravelPlan) -> Self {
        Self {
            id: plan.id.clone(),
            title: plan.title.clone(),
            preferences: plan.preferences.clone(),
            daily_itineraries: plan.daily_itineraries.clone(),
            total_budget: plan.total_budget,
            spent_budget: plan.spent_budget,
            status: plan.status,
            user_id: plan.user_id.clone(),
            created_at: to_bson_datetime(plan.created_at),
            updated_at: to_bson_datetime(plan.updated_at),
        }
    }
}

impl From<PlanRecord> for TravelPlan {
    fn from(record: PlanRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            created_at: from_bson_datetime(record.created_at),
            updated_at: from_bson_datetime(record.updated_at),
            preferences: record.preferences,
            daily_itineraries: record.daily_itineraries,
            total_budget: record.total_budget,
            spent_budget: record.spent_budget,
            status: record.status,
            user_id: record.user_id,
        }
    }
}

/// `$set` document holding only the provided fields plus `updated_at`.
pub fn update_document(update: &PlanUpdate, now: DateTime<Utc>) -> Result<Document, PlannerError> {
    let mut set = doc! { "updated_at": to_bson_datetime(now) };

    if let Some(title) = &update.title {
        set.insert("title", title.clone());
    }
    if let Some(preferences) = &update.preferences {
        set.insert("preferences", bson::to_bson(preferences)?);
    }
    if let Some(days) = &update.daily_itineraries {
        set.insert("daily_itineraries", bson::to_bson(days)?);
        if update.spent_budget.is_none() {
            let derived: f64 = days.iter().map(|d| d.total_cost).sum();
            set.insert("spent_budget", derived);
        }
    }
    if let Some(total_budget) = update.total_budget {
        set.insert("total_budget", total_budget);
    }
    if let Some(spent_budget) = update.spent_budget {
        set.insert("spent_budget", spent_budget);
    }
    if let Some(status) = update.status {
        set.insert("status", status.as_str());
    }

    Ok(doc! { "$set": set })
}

fn decode_record(document: Document) -> Option<TravelPlan> {
    let id = document.get("_id").cloned().unwrap_or(Bson::Null);
    match bson::from_document::<PlanRecord>(document) {
        Ok(record) => Some(record.into()),
        Err(err) => {
            log::warn!("Skipping undecodable plan row {}: {}", id, err);
            None
        }
    }
}

pub struct MongoPlanStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoPlanStore {
    pub fn new(database: &Database) -> Self {
        Self {
            database: database.clone(),
            collection: database.collection(PLANS_COLLECTION),
        }
    }
}

#[async_trait]
impl RemotePlanStore for MongoPlanStore {
    async fn insert(&self, plan: &TravelPlan) -> Result<TravelPlan, PlannerError> {
        let document = bson::to_document(&PlanRecord::from(plan))?;
        self.collection.insert_one(document).await?;
        Ok(plan.clone())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError> {
        let filter = match user_id {
            Some(user_id) => doc! { "user_id": user_id },
            None => doc! {},
        };

        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        Ok(documents.into_iter().filter_map(decode_record).collect())
    }

    async fn update(
        &self,
        id: &str,
        update: &PlanUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<TravelPlan>, PlannerError> {
        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": id }, update_document(update, now)?)
            .return_document(ReturnDocument::After)
            .await?;

        Ok(updated.and_then(decode_record))
    }

    async fn delete(&self, id: &str) -> Result<bool, PlannerError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> Result<(), PlannerError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

/// Plan store kept in process memory. It can be switched offline or made
/// slow to answer list queries, to exercise the degraded paths.
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<Vec<TravelPlan>>,
    offline: AtomicBool,
    list_delay_ms: AtomicU64,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.plans.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_online(&self) -> Result<(), PlannerError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(PlannerError::Network {
                endpoint: "plan store",
                detail: "store is offline".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemotePlanStore for InMemoryPlanStore {
    async fn insert(&self, plan: &TravelPlan) -> Result<TravelPlan, PlannerError> {
        self.check_online()?;
        let mut plans = self.plans.lock().await;
        if plans.iter().any(|stored| stored.id == plan.id) {
            return Err(PlannerError::Conflict(format!("plan {}", plan.id)));
        }
        plans.push(plan.clone());
        Ok(plan.clone())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<TravelPlan>, PlannerError> {
        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_online()?;
        let mut plans: Vec<TravelPlan> = self
            .plans
            .lock()
            .await
            .iter()
            .filter(|plan| user_id.is_none() || plan.user_id.as_deref() == user_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }

    async fn update(
        &self,
        id: &str,
        update: &PlanUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<TravelPlan>, PlannerError> {
        self.check_online()?;
        let mut plans = self.plans.lock().await;
        Ok(plans.iter_mut().find(|plan| plan.id == id).map(|plan| {
            update.apply_to(plan, now);
            plan.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, PlannerError> {
        self.check_online()?;
        let mut plans = self.plans.lock().await;
        let before = plans.len();
        plans.retain(|plan| plan.id != id);
        Ok(plans.len() < before)
    }

    async fn ping(&self) -> Result<(), PlannerError> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sample_plans::sample_plans;

    #[test]
    fn test_update_document_uses_snake_case_and_only_given_fields() {
        let update = PlanUpdate {
            title: Some("New title".to_string()),
            status: Some(PlanStatus::Ongoing),
            ..Default::default()
        };

        let document = update_document(&update, Utc::now()).unwrap();
        let set = document.get_document("$set").unwrap();

        assert_eq!(set.get_str("title").unwrap(), "New title");
        assert_eq!(set.get_str("status").unwrap(), "ongoing");
        assert!(set.contains_key("updated_at"));
        assert!(!set.contains_key("total_budget"));
        assert!(!set.contains_key("daily_itineraries"));
    }

    #[test]
    fn test_update_document_derives_spend_for_new_days() {
        let days = sample_plans(None)[1].daily_itineraries.clone();
        let update = PlanUpdate {
            daily_itineraries: Some(days),
            ..Default::default()
        };

        let document = update_document(&update, Utc::now()).unwrap();
        let set = document.get_document("$set").unwrap();
        assert_eq!(set.get_f64("spent_budget").unwrap(), 60.0);
        assert!(set.get_array("daily_itineraries").is_ok());
    }

    #[test]
    fn test_record_round_trip_keeps_fields() {
        let plan = sample_plans(Some("u1")).remove(0);
        let document = bson::to_document(&PlanRecord::from(&plan)).unwrap();

        assert_eq!(document.get_str("_id").unwrap(), plan.id);
        assert_eq!(document.get_str("user_id").unwrap(), "u1");
        assert!(document.get_datetime("created_at").is_ok());

        let back = decode_record(document).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_undecodable_row_is_skipped() {
        assert!(decode_record(doc! { "_id": "x", "title": 5 }).is_none());
    }

    #[actix_rt::test]
    async fn test_in_memory_store_lists_newest_first_per_user() {
        let store = InMemoryPlanStore::new();
        let mut plans = sample_plans(Some("u1"));
        plans[1].user_id = Some("u2".to_string());
        for plan in plans.iter().rev() {
            store.insert(plan).await.unwrap();
        }

        let all = store.list(None).await.unwrap();
        assert_eq!(all[0].id, plans[0].id);
        assert_eq!(store.list(Some("u2")).await.unwrap().len(), 1);

        store.set_offline(true);
        assert!(matches!(
            store.list(None).await,
            Err(PlannerError::Network { .. })
        ));
    }
}
