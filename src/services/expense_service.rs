use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use tokio::sync::Mutex;

use crate::error::PlannerError;
use crate::models::expense::{
    from_minor_units, to_bson_datetime, to_minor_units, ExpenseDocument, ExpenseInput,
    ExpenseRecord, ExpenseTotal,
};

pub const EXPENSES_COLLECTION: &str = "expense_records";

/// Raw access to stored expense rows.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Rows of `plan_id`, latest `expense_time` first.
    async fn find_by_plan(&self, plan_id: &str) -> Result<Vec<ExpenseDocument>, PlannerError>;
    async fn insert(&self, expense: &ExpenseDocument) -> Result<(), PlannerError>;
    /// `Ok(None)` when `id` is unknown.
    async fn update(
        &self,
        id: &str,
        input: &ExpenseInput,
        now: DateTime<Utc>,
    ) -> Result<Option<ExpenseDocument>, PlannerError>;
    async fn delete(&self, id: &str) -> Result<bool, PlannerError>;
}

pub struct MongoExpenseStore {
    collection: Collection<ExpenseDocument>,
}

impl MongoExpenseStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(EXPENSES_COLLECTION),
        }
    }
}

#[async_trait]
impl ExpenseStore for MongoExpenseStore {
    async fn find_by_plan(&self, plan_id: &str) -> Result<Vec<ExpenseDocument>, PlannerError> {
        let cursor = self
            .collection
            .find(doc! { "plan_id": plan_id })
            .sort(doc! { "expense_time": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert(&self, expense: &ExpenseDocument) -> Result<(), PlannerError> {
        self.collection.insert_one(expense).await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        input: &ExpenseInput,
        now: DateTime<Utc>,
    ) -> Result<Option<ExpenseDocument>, PlannerError> {
        let update = doc! {
            "$set": {
                "amount": to_minor_units(input.amount),
                "reason": input.reason.trim(),
                "expense_time": to_bson_datetime(input.expense_time),
                "updated_at": to_bson_datetime(now),
            }
        };

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, update)
            .return_document(mongodb::options::ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, PlannerError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

#[derive(Default)]
pub struct InMemoryExpenseStore {
    rows: Mutex<Vec<ExpenseDocument>>,
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn find_by_plan(&self, plan_id: &str) -> Result<Vec<ExpenseDocument>, PlannerError> {
        let mut rows: Vec<ExpenseDocument> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.plan_id == plan_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.expense_time.cmp(&a.expense_time));
        Ok(rows)
    }

    async fn insert(&self, expense: &ExpenseDocument) -> Result<(), PlannerError> {
        self.rows.lock().await.push(expense.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        input: &ExpenseInput,
        now: DateTime<Utc>,
    ) -> Result<Option<ExpenseDocument>, PlannerError> {
        let mut rows = self.rows.lock().await;
        Ok(rows.iter_mut().find(|row| row.id == id).map(|row| {
            row.amount = to_minor_units(input.amount);
            row.reason = input.reason.trim().to_string();
            row.expense_time = to_bson_datetime(input.expense_time);
            row.updated_at = to_bson_datetime(now);
            row.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, PlannerError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() < before)
    }
}

/// Expenses recorded against a plan.
pub struct ExpenseService {
    store: Arc<dyn ExpenseStore>,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }

    pub async fn list_by_plan(&self, plan_id: &str) -> Result<Vec<ExpenseRecord>, PlannerError> {
        let rows = self.store.find_by_plan(plan_id).await?;
        Ok(rows.into_iter().map(ExpenseRecord::from).collect())
    }

    pub async fn create(
        &self,
        plan_id: &str,
        input: &ExpenseInput,
    ) -> Result<ExpenseRecord, PlannerError> {
        input.validate()?;
        let expense = ExpenseDocument::new(plan_id, input, Utc::now());
        self.store.insert(&expense).await?;
        log::info!("Recorded expense {} for plan {}", expense.id, plan_id);
        Ok(expense.into())
    }

    pub async fn update(&self, id: &str, input: &ExpenseInput) -> Result<ExpenseRecord, PlannerError> {
        input.validate()?;
        self.store
            .update(id, input, Utc::now())
            .await?
            .map(ExpenseRecord::from)
            .ok_or_else(|| PlannerError::NotFound(format!("expense {}", id)))
    }

    pub async fn delete(&self, id: &str) -> Result<(), PlannerError> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(PlannerError::NotFound(format!("expense {}", id)))
        }
    }

    /// Sum of every expense of `plan_id`, summed in minor units.
    pub async fn total_for_plan(&self, plan_id: &str) -> Result<ExpenseTotal, PlannerError> {
        let rows = self.store.find_by_plan(plan_id).await?;
        let total: i64 = rows.iter().map(|row| row.amount).sum();
        Ok(ExpenseTotal {
            plan_id: plan_id.to_string(),
            total: from_minor_units(total),
            count: rows.len(),
        })
    }
}
