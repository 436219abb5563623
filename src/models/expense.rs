use chrono::{DateTime, Utc};
use mongodb::bson;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// Expense as exposed over the API, amount in major currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub id: String,
    pub plan_id: String,
    pub amount: f64,
    pub reason: String,
    pub expense_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub amount: f64,
    pub reason: String,
    pub expense_time: DateTime<Utc>,
}

impl ExpenseInput {
    pub fn validate(&self) -> Result<(), PlannerError> {
        let mut problems = Vec::new();
        if !self.amount.is_finite() || self.amount < 0.0 {
            problems.push("amount must be a non-negative number".to_string());
        }
        if self.reason.trim().is_empty() {
            problems.push("reason must not be empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PlannerError::Validation(problems))
        }
    }
}

/// Row of the `expense_records` collection. Amounts are kept in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub plan_id: String,
    pub amount: i64,
    pub reason: String,
    pub expense_time: bson::DateTime,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}

pub fn to_bson_datetime(value: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(value.timestamp_millis())
}

pub fn from_bson_datetime(value: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

impl ExpenseDocument {
    pub fn new(plan_id: &str, input: &ExpenseInput, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            amount: to_minor_units(input.amount),
            reason: input.reason.trim().to_string(),
            expense_time: to_bson_datetime(input.expense_time),
            created_at: to_bson_datetime(now),
            updated_at: to_bson_datetime(now),
        }
    }
}

impl From<ExpenseDocument> for ExpenseRecord {
    fn from(doc: ExpenseDocument) -> Self {
        Self {
            id: doc.id,
            plan_id: doc.plan_id,
            amount: from_minor_units(doc.amount),
            reason: doc.reason,
            expense_time: from_bson_datetime(doc.expense_time),
            created_at: from_bson_datetime(doc.created_at),
            updated_at: from_bson_datetime(doc.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseTotal {
    pub plan_id: String,
    pub total: f64,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion_rounds_to_cents() {
        assert_eq!(to_minor_units(12.34), 1234);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(from_minor_units(1999), 19.99);
    }

    #[test]
    fn test_document_converts_back_to_major_units() {
        let now = Utc::now();
        let input = ExpenseInput {
            amount: 45.5,
            reason: " taxi ".to_string(),
            expense_time: now,
        };

        let doc = ExpenseDocument::new("plan-1", &input, now);
        assert_eq!(doc.amount, 4550);
        assert_eq!(doc.reason, "taxi");

        let record = ExpenseRecord::from(doc);
        assert_eq!(record.amount, 45.5);
        assert_eq!(record.plan_id, "plan-1");
        assert_eq!(record.expense_time.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_input_validation() {
        let input = ExpenseInput {
            amount: -1.0,
            reason: "".to_string(),
            expense_time: Utc::now(),
        };
        assert!(matches!(input.validate(), Err(PlannerError::Validation(p)) if p.len() == 2));
    }
}
