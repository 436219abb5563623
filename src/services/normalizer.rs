//! Turns untrusted model output into a [`TravelPlan`].
//!
//! Parsing is attempted twice: once on the trimmed text and once on a
//! repaired candidate (first balanced object, disallowed characters removed,
//! trailing commas dropped). Every field is then defaulted or coerced so a
//! successful return always satisfies the plan invariants.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::PlannerError;
use crate::models::plan::DAY_DATE_FORMAT;
use crate::models::{Activity, ActivityType, DailyItinerary, PlanStatus, TravelPlan, TravelPreference};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const PLACEHOLDER_ACTIVITY_NAME: &str = "Unnamed activity";
const EXCERPT_CHARS: usize = 500;

pub fn normalize(raw: &str, preference: &TravelPreference) -> Result<TravelPlan, PlannerError> {
    normalize_at(raw, preference, Utc::now())
}

pub fn normalize_at(
    raw: &str,
    preference: &TravelPreference,
    now: DateTime<Utc>,
) -> Result<TravelPlan, PlannerError> {
    let payload = parse_payload(raw)?;
    let plan = build_plan(&payload, preference, now).map_err(|reason| {
        PlannerError::MalformedResponse {
            reason,
            excerpt: excerpt(raw),
        }
    })?;
    plan.validate()?;
    Ok(plan)
}

/// Direct parse, then one repaired retry.
pub fn parse_payload(raw: &str) -> Result<Value, PlannerError> {
    let trimmed = raw.trim();

    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    log::warn!(
        "Model output is not valid JSON ({}), attempting repair of {} chars",
        first_error,
        trimmed.len()
    );

    match repair(trimmed).map(|candidate| serde_json::from_str::<Value>(&candidate)) {
        Some(Ok(value)) => {
            log::info!("Recovered model output after repair");
            Ok(value)
        }
        Some(Err(repair_error)) => Err(PlannerError::MalformedResponse {
            reason: format!("{} (after repair: {})", first_error, repair_error),
            excerpt: excerpt(raw),
        }),
        None => Err(PlannerError::MalformedResponse {
            reason: format!("{} (no JSON object found)", first_error),
            excerpt: excerpt(raw),
        }),
    }
}

/// Builds the repaired candidate, or `None` when the text holds no complete
/// brace-delimited object.
pub fn repair(text: &str) -> Option<String> {
    let candidate = first_balanced_object(text)?;

    let disallowed = Regex::new(r#"[^\p{L}\p{N}\s{}\[\]":,.+\-_]"#).ok()?;
    let trailing_comma = Regex::new(r",(\s*[}\]])").ok()?;

    let stripped = disallowed.replace_all(candidate, "");
    Some(trailing_comma.replace_all(&stripped, "$1").into_owned())
}

/// Slice from the first `{` to its matching `}`. Braces inside string
/// literals do not count.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}

fn build_plan(
    payload: &Value,
    preference: &TravelPreference,
    now: DateTime<Utc>,
) -> Result<TravelPlan, String> {
    let object = payload
        .as_object()
        .ok_or_else(|| "top-level value is not a JSON object".to_string())?;

    let title = non_empty_string(object.get("title"))
        .unwrap_or_else(|| format!("{} travel plan", preference.destination));

    let raw_days = match object.get("dailyItineraries") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(days)) => days.clone(),
        Some(_) => return Err("dailyItineraries is not an array".to_string()),
    };

    let empty = Map::new();
    let daily_itineraries: Vec<DailyItinerary> = raw_days
        .iter()
        .enumerate()
        .map(|(day_index, day)| {
            normalize_day(day.as_object().unwrap_or(&empty), day_index, preference)
        })
        .collect();

    let derived_spent: f64 = daily_itineraries.iter().map(|d| d.total_cost).sum();
    let spent_budget = amount(object.get("spentBudget")).unwrap_or(derived_spent);

    Ok(TravelPlan {
        id: TravelPlan::new_id(),
        title,
        created_at: now,
        updated_at: now,
        preferences: preference.clone(),
        daily_itineraries,
        total_budget: preference.budget,
        spent_budget,
        status: PlanStatus::Planned,
        user_id: None,
    })
}

fn normalize_day(
    day: &Map<String, Value>,
    day_index: usize,
    preference: &TravelPreference,
) -> DailyItinerary {
    let date = day
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_day_date)
        .unwrap_or_else(|| {
            let fallback = preference
                .start_date
                .checked_add_signed(Duration::days(day_index as i64))
                .unwrap_or(preference.start_date);
            log::warn!(
                "Day {} has no usable date, using {} from the trip start",
                day_index,
                fallback
            );
            fallback
        });

    let activities: Vec<Activity> = day
        .get("activities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(activity_index, item)| {
                    item.as_object()
                        .map(|fields| normalize_activity(fields, day_index, activity_index))
                })
                .collect()
        })
        .unwrap_or_default();

    let activity_cost: f64 = activities.iter().map(|a| a.cost).sum();
    let total_cost = amount(day.get("totalCost")).unwrap_or(activity_cost);

    DailyItinerary {
        date: date.format(DAY_DATE_FORMAT).to_string(),
        activities,
        total_cost,
    }
}

fn normalize_activity(
    fields: &Map<String, Value>,
    day_index: usize,
    activity_index: usize,
) -> Activity {
    let kind = fields
        .get("type")
        .and_then(Value::as_str)
        .map(ActivityType::coerce)
        .unwrap_or_default();

    let duration = number(fields.get("duration"))
        .filter(|minutes| *minutes >= 0.0 && *minutes <= u32::MAX as f64)
        .map(|minutes| minutes.trunc() as u32)
        .unwrap_or(DEFAULT_DURATION_MINUTES);

    let images = fields.get("images").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let coordinates = fields
        .get("coordinates")
        .and_then(Value::as_array)
        .filter(|pair| pair.len() >= 2)
        .and_then(|pair| Some((number(pair.first())?, number(pair.get(1))?)));

    Activity {
        id: format!("act-{}-{}", day_index, activity_index),
        kind,
        name: non_empty_string(fields.get("name"))
            .unwrap_or_else(|| PLACEHOLDER_ACTIVITY_NAME.to_string()),
        address: non_empty_string(fields.get("address")),
        duration,
        cost: amount(fields.get("cost")).unwrap_or(0.0),
        description: fields
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        opening_hours: non_empty_string(fields.get("openingHours")),
        rating: number(fields.get("rating")),
        images,
        coordinates,
    }
}

/// Accepts `2025-04-01` and anything that starts with it, such as an ISO timestamp.
fn parse_day_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DAY_DATE_FORMAT)
        .ok()
        .or_else(|| raw.get(..10).and_then(|prefix| NaiveDate::parse_from_str(prefix, DAY_DATE_FORMAT).ok()))
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers, or strings starting with a number ("120 min", "35.5").
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn amount(value: Option<&Value>) -> Option<f64> {
    number(value).filter(|n| *n >= 0.0)
}

fn leading_number(text: &str) -> Option<f64> {
    let pattern = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").ok()?;
    pattern
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
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

    const KYOTO_RESPONSE: &str = r#"{"title":"Kyoto trip","dailyItineraries":[{"date":"2025-04-01","activities":[{"type":"attraction","name":"Fushimi Inari","cost":0,"duration":120,"description":"shrine walk"}],"totalCost":0}],"spentBudget":0}"#;

    #[test]
    fn test_kyoto_scenario() {
        let plan = normalize(KYOTO_RESPONSE, &kyoto()).unwrap();

        assert_eq!(plan.title, "Kyoto trip");
        assert_eq!(plan.total_budget, 3000.0);
        assert_eq!(plan.spent_budget, 0.0);
        assert_eq!(plan.status, PlanStatus::Planned);
        assert_eq!(plan.daily_itineraries.len(), 1);

        let day = &plan.daily_itineraries[0];
        assert_eq!(day.date, "2025-04-01");
        assert_eq!(day.activities.len(), 1);
        assert_eq!(day.activities[0].kind, ActivityType::Attraction);
        assert_eq!(day.activities[0].name, "Fushimi Inari");
        assert_eq!(day.activities[0].duration, 120);
        assert_eq!(day.activities[0].id, "act-0-0");
        assert!(uuid::Uuid::parse_str(&plan.id).is_ok());
    }

    #[test]
    fn test_trailing_comma_is_repaired() {
        let raw = r#"{"title":"Kyoto trip","dailyItineraries":[{"date":"2025-04-01","activities":[],"totalCost":0},]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.daily_itineraries.len(), 1);
    }

    #[test]
    fn test_markdown_fence_is_repaired() {
        let raw = format!("Here is your plan:\n```json\n{}\n```\nEnjoy!", KYOTO_RESPONSE);
        let plan = normalize(&raw, &kyoto()).unwrap();
        assert_eq!(plan.title, "Kyoto trip");
    }

    #[test]
    fn test_non_json_text_is_malformed() {
        let result = normalize("Sorry, I cannot help with that.", &kyoto());
        match result {
            Err(PlannerError::MalformedResponse { excerpt, .. }) => {
                assert_eq!(excerpt, "Sorry, I cannot help with that.");
            }
            other => panic!("expected malformed response, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_object_is_malformed() {
        let raw = r#"{"title":"Kyoto trip","dailyItineraries":[{"date":"2025-04-01""#;
        assert!(matches!(
            normalize(raw, &kyoto()),
            Err(PlannerError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let raw = "x".repeat(2000);
        match normalize(&raw, &kyoto()) {
            Err(PlannerError::MalformedResponse { excerpt, .. }) => assert_eq!(excerpt.len(), 500),
            other => panic!("expected malformed response, got {:?}", other),
        }
    }

    #[test]
    fn test_top_level_array_is_malformed() {
        assert!(matches!(
            normalize("[1, 2, 3]", &kyoto()),
            Err(PlannerError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_days_must_be_an_array() {
        assert!(matches!(
            normalize(r#"{"dailyItineraries":{"date":"2025-04-01"}}"#, &kyoto()),
            Err(PlannerError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = r#"{"dailyItineraries":[{"activities":[{"type":"museum"},{"name":"Nishiki Market","type":"restaurant","cost":"35.5","duration":"90 minutes"}]}]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();

        assert_eq!(plan.title, "Kyoto travel plan");
        let day = &plan.daily_itineraries[0];
        assert_eq!(day.date, "2025-04-01");

        let first = &day.activities[0];
        assert_eq!(first.kind, ActivityType::Attraction);
        assert_eq!(first.name, PLACEHOLDER_ACTIVITY_NAME);
        assert_eq!(first.duration, DEFAULT_DURATION_MINUTES);
        assert_eq!(first.cost, 0.0);
        assert_eq!(first.address, None);

        let second = &day.activities[1];
        assert_eq!(second.kind, ActivityType::Restaurant);
        assert_eq!(second.cost, 35.5);
        assert_eq!(second.duration, 90);
        assert_eq!(second.id, "act-0-1");

        assert_eq!(day.total_cost, 35.5);
        assert_eq!(plan.spent_budget, 35.5);
    }

    #[test]
    fn test_missing_dates_follow_trip_start() {
        let raw = r#"{"dailyItineraries":[{"date":"2025-04-01"},{"date":"tomorrow"},{}]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        let dates: Vec<&str> = plan.daily_itineraries.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-04-01", "2025-04-02", "2025-04-03"]);
    }

    #[test]
    fn test_date_past_calendar_end_keeps_trip_start() {
        let mut preference = kyoto();
        preference.start_date = NaiveDate::MAX;
        preference.end_date = NaiveDate::MAX;

        let day = normalize_day(&Map::new(), 3, &preference);
        assert_eq!(day.date, NaiveDate::MAX.format(DAY_DATE_FORMAT).to_string());
    }

    #[test]
    fn test_timestamp_dates_are_cut_to_day() {
        let raw = r#"{"dailyItineraries":[{"date":"2025-04-02T09:00:00Z"}]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.daily_itineraries[0].date, "2025-04-02");
    }

    #[test]
    fn test_explicit_spent_budget_wins_over_sum() {
        let raw = r#"{"dailyItineraries":[{"date":"2025-04-01","activities":[],"totalCost":400}],"spentBudget":1200}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.spent_budget, 1200.0);
    }

    #[test]
    fn test_negative_spent_budget_falls_back_to_sum() {
        let raw = r#"{"dailyItineraries":[{"date":"2025-04-01","totalCost":400},{"date":"2025-04-02","totalCost":100}],"spentBudget":-5}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.spent_budget, 500.0);
    }

    #[test]
    fn test_total_budget_comes_from_preference() {
        let raw = r#"{"totalBudget":99999,"dailyItineraries":[]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.total_budget, 3000.0);
        assert!(plan.daily_itineraries.is_empty());
        assert_eq!(plan.spent_budget, 0.0);
    }

    #[test]
    fn test_optional_fields_are_kept() {
        let raw = r#"{"dailyItineraries":[{"date":"2025-04-01","activities":[{"type":"attraction","name":"Kinkaku-ji","address":"1 Kinkakujicho","openingHours":"09:00-17:00","rating":4.7,"images":["a.jpg",3],"coordinates":[135.729,35.039]}]}]}"#;
        let plan = normalize(raw, &kyoto()).unwrap();
        let activity = &plan.daily_itineraries[0].activities[0];

        assert_eq!(activity.address.as_deref(), Some("1 Kinkakujicho"));
        assert_eq!(activity.opening_hours.as_deref(), Some("09:00-17:00"));
        assert_eq!(activity.rating, Some(4.7));
        assert_eq!(activity.images, Some(vec!["a.jpg".to_string()]));
        assert_eq!(activity.coordinates, Some((135.729, 35.039)));
    }

    #[test]
    fn test_balanced_object_ignores_braces_in_strings() {
        let text = r#"noise {"name":"a } b","x":{"y":1}} trailing {"#;
        assert_eq!(
            first_balanced_object(text),
            Some(r#"{"name":"a } b","x":{"y":1}}"#)
        );
        assert_eq!(first_balanced_object("no braces"), None);
    }

    #[test]
    fn test_repair_strips_disallowed_characters() {
        let repaired = repair("{\"title\":\"Kyoto ✈ trip\",}").unwrap();
        assert_eq!(repaired, "{\"title\":\"Kyoto  trip\"}");
    }

    #[test]
    fn test_unicode_text_survives_repair() {
        let raw = "{\"title\":\"京都 旅行计划\",\"dailyItineraries\":[],}";
        let plan = normalize(raw, &kyoto()).unwrap();
        assert_eq!(plan.title, "京都 旅行计划");
    }
}
