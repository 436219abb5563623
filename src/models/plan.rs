use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PlannerError;
use crate::models::preference::TravelPreference;

pub const DAY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Kind of a scheduled item. Anything the generator or a stored record
/// spells differently is read as [`ActivityType::Attraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivityType {
    Transport,
    Accommodation,
    #[default]
    Attraction,
    Restaurant,
}

impl ActivityType {
    pub const ALL: [ActivityType; 4] = [
        ActivityType::Transport,
        ActivityType::Accommodation,
        ActivityType::Attraction,
        ActivityType::Restaurant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Transport => "transport",
            ActivityType::Accommodation => "accommodation",
            ActivityType::Attraction => "attraction",
            ActivityType::Restaurant => "restaurant",
        }
    }

    /// Exact (case-insensitive) label match, `None` for anything else.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == label)
    }

    /// Lenient conversion used for untrusted input.
    pub fn coerce(label: &str) -> Self {
        Self::parse(label).unwrap_or_default()
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(serde_json::Value::String(label)) => ActivityType::coerce(&label),
            _ => ActivityType::default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Planned,
    Ongoing,
    Completed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Planned => "planned",
            PlanStatus::Ongoing => "ongoing",
            PlanStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ActivityType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Minutes.
    pub duration: u32,
    pub cost: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// (longitude, latitude)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyItinerary {
    pub date: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub total_cost: f64,
}

impl DailyItinerary {
    pub fn activity_cost(&self) -> f64 {
        self.activities.iter().map(|a| a.cost).sum()
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DAY_DATE_FORMAT).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelPlan {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preferences: TravelPreference,
    #[serde(default)]
    pub daily_itineraries: Vec<DailyItinerary>,
    pub total_budget: f64,
    pub spent_budget: f64,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TravelPlan {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Sum of every day's total. Used whenever no explicit spend is known.
    pub fn derived_spent_budget(&self) -> f64 {
        self.daily_itineraries.iter().map(|d| d.total_cost).sum()
    }

    pub fn activity_count(&self) -> usize {
        self.daily_itineraries.iter().map(|d| d.activities.len()).sum()
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.id.trim().is_empty() {
            problems.push("plan id must not be empty".to_string());
        }
        if self.title.trim().is_empty() {
            problems.push("plan title must not be empty".to_string());
        }
        for problem in self.preferences.problems() {
            problems.push(format!("preferences: {}", problem));
        }
        if !is_amount(self.total_budget) {
            problems.push("total budget must be a non-negative number".to_string());
        }
        if !is_amount(self.spent_budget) {
            problems.push("spent budget must be a non-negative number".to_string());
        }

        for (day_index, day) in self.daily_itineraries.iter().enumerate() {
            problems.extend(day_problems(day_index, day));
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
}

fn is_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn day_problems(day_index: usize, day: &DailyItinerary) -> Vec<String> {
    let mut problems = Vec::new();

    if day.parsed_date().is_none() {
        problems.push(format!("day {}: invalid date {:?}", day_index, day.date));
    }
    if !is_amount(day.total_cost) {
        problems.push(format!("day {}: total cost must be non-negative", day_index));
    }

    let mut ids = HashSet::new();
    for activity in &day.activities {
        if !ids.insert(activity.id.as_str()) {
            problems.push(format!(
                "day {}: duplicate activity id {}",
                day_index, activity.id
            ));
        }
        if !is_amount(activity.cost) {
            problems.push(format!(
                "day {}: activity {} has an invalid cost",
                day_index, activity.id
            ));
        }
        if activity.rating.is_some_and(|r| !r.is_finite()) {
            problems.push(format!(
                "day {}: activity {} has an invalid rating",
                day_index, activity.id
            ));
        }
    }

    problems
}

/// Partial update of a stored plan. Only the fields that are present are
/// written; structure (days and activities) can only be replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<TravelPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_itineraries: Option<Vec<DailyItinerary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spent_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
}

impl PlanUpdate {
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Problems the present fields would introduce into any plan.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.is_empty() {
            problems.push("update contains no fields".to_string());
        }
        if self.title.as_ref().is_some_and(|t| t.trim().is_empty()) {
            problems.push("plan title must not be empty".to_string());
        }
        if let Some(preferences) = &self.preferences {
            for problem in preferences.problems() {
                problems.push(format!("preferences: {}", problem));
            }
        }
        if self.total_budget.is_some_and(|v| !is_amount(v)) {
            problems.push("total budget must be a non-negative number".to_string());
        }
        if self.spent_budget.is_some_and(|v| !is_amount(v)) {
            problems.push("spent budget must be a non-negative number".to_string());
        }
        if let Some(days) = &self.daily_itineraries {
            for (day_index, day) in days.iter().enumerate() {
                problems.extend(day_problems(day_index, day));
            }
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

    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.title.is_some() {
            names.push("title");
        }
        if self.preferences.is_some() {
            names.push("preferences");
        }
        if self.daily_itineraries.is_some() {
            names.push("dailyItineraries");
        }
        if self.total_budget.is_some() {
            names.push("totalBudget");
        }
        if self.spent_budget.is_some() {
            names.push("spentBudget");
        }
        if self.status.is_some() {
            names.push("status");
        }
        names
    }

    /// Applies the present fields to `plan`. Replacing the days without an
    /// explicit spend re-derives the spend from the new day totals.
    pub fn apply_to(&self, plan: &mut TravelPlan, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            plan.title = title.clone();
        }
        if let Some(preferences) = &self.preferences {
            plan.preferences = preferences.clone();
        }
        if let Some(days) = &self.daily_itineraries {
            plan.daily_itineraries = days.clone();
            if self.spent_budget.is_none() {
                plan.spent_budget = plan.derived_spent_budget();
            }
        }
        if let Some(total_budget) = self.total_budget {
            plan.total_budget = total_budget;
        }
        if let Some(spent_budget) = self.spent_budget {
            plan.spent_budget = spent_budget;
        }
        if let Some(status) = self.status {
            plan.status = status;
        }
        plan.updated_at = now;
    }
}
