use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// What a traveller asked for. Consumed once per generation request and
/// kept as a snapshot inside the resulting plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelPreference {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    pub people_count: u32,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl TravelPreference {
    /// Collects every problem instead of stopping at the first one.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.destination.trim().is_empty() {
            problems.push("destination must not be empty".to_string());
        }
        if self.start_date > self.end_date {
            problems.push(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            ));
        }
        if !self.budget.is_finite() || self.budget <= 0.0 {
            problems.push("budget must be a positive number".to_string());
        }
        if self.people_count == 0 {
            problems.push("people count must be at least 1".to_string());
        }

        problems
    }

    pub fn validate(&self) -> Result<(), PlannerError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PlannerError::Validation(problems))
        }
    }

    /// Trims tags, drops empty ones and removes duplicates (case-insensitive).
    /// Tags are a set, so the first spelling wins and order is kept only
    /// for presentation.
    pub fn normalized(mut self) -> Self {
        self.destination = self.destination.trim().to_string();

        let mut seen: Vec<String> = Vec::new();
        let mut tags = Vec::new();
        for tag in self.preferences {
            let tag = tag.trim().to_string();
            let key = tag.to_lowercase();
            if tag.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            tags.push(tag);
        }
        self.preferences = tags;
        self
    }

    /// Number of calendar days covered, both ends included.
    pub fn trip_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kyoto() -> TravelPreference {
        TravelPreference {
            destination: "Kyoto".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
            budget: 3000.0,
            people_count: 2,
            preferences: vec!["food".to_string(), "culture".to_string()],
        }
    }

    #[test]
    fn test_valid_preference_passes() {
        assert!(kyoto().validate().is_ok());
        assert_eq!(kyoto().trip_days(), 3);
    }

    #[test]
    fn test_reports_every_problem() {
        let mut pref = kyoto();
        pref.destination = "  ".to_string();
        pref.budget = 0.0;
        pref.people_count = 0;
        pref.end_date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();

        assert_eq!(pref.problems().len(), 4);
        assert!(matches!(pref.validate(), Err(PlannerError::Validation(p)) if p.len() == 4));
    }

    #[test]
    fn test_normalized_drops_blank_and_duplicate_tags() {
        let mut pref = kyoto();
        pref.preferences = vec![
            " food ".to_string(),
            "".to_string(),
            "FOOD".to_string(),
            "temples".to_string(),
        ];

        let pref = pref.normalized();
        assert_eq!(pref.preferences, vec!["food".to_string(), "temples".to_string()]);
    }

    #[test]
    fn test_deserializes_camel_case_dates() {
        let pref: TravelPreference = serde_json::from_str(
            r#"{"destination":"Kyoto","startDate":"2025-04-01","endDate":"2025-04-03","budget":3000,"peopleCount":2,"preferences":["food"]}"#,
        )
        .unwrap();
        assert_eq!(pref.start_date, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert_eq!(pref.people_count, 2);
    }
}
