//! Fixed illustrative plans served when neither the store nor the cache has
//! anything, so a first visit never shows an error. Everything here is
//! constant, which keeps repeated listings identical.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::models::{Activity, ActivityType, DailyItinerary, PlanStatus, TravelPlan, TravelPreference};

pub const SAMPLE_USER_ID: &str = "sample-user";

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn activity(
    id: &str,
    kind: ActivityType,
    name: &str,
    address: &str,
    duration: u32,
    cost: f64,
    description: &str,
    opening_hours: &str,
    rating: f64,
    coordinates: (f64, f64),
) -> Activity {
    Activity {
        id: id.to_string(),
        kind,
        name: name.to_string(),
        address: Some(address.to_string()),
        duration,
        cost,
        description: description.to_string(),
        opening_hours: Some(opening_hours.to_string()),
        rating: Some(rating),
        images: Some(Vec::new()),
        coordinates: Some(coordinates),
    }
}

fn day(date: &str, activities: Vec<Activity>) -> DailyItinerary {
    let total_cost = activities.iter().map(|a| a.cost).sum();
    DailyItinerary {
        date: date.to_string(),
        activities,
        total_cost,
    }
}

/// Sample plans, newest first, owned by `user_id` or by [`SAMPLE_USER_ID`].
pub fn sample_plans(user_id: Option<&str>) -> Vec<TravelPlan> {
    let owner = Some(user_id.unwrap_or(SAMPLE_USER_ID).to_string());

    let shanghai_days = vec![day(
        "2025-05-10",
        vec![activity(
            "act-sample-1",
            ActivityType::Attraction,
            "The Bund promenade",
            "Zhongshan East 1st Road, Shanghai",
            120,
            0.0,
            "Evening walk along the Huangpu river skyline",
            "Open all day",
            4.8,
            (121.487, 31.240),
        )],
    )];

    let beijing_days = vec![day(
        "2025-06-01",
        vec![activity(
            "act-sample-2",
            ActivityType::Attraction,
            "The Palace Museum",
            "4 Jingshan Front Street, Beijing",
            240,
            60.0,
            "Imperial palace of the Ming and Qing dynasties",
            "08:30-17:00",
            4.9,
            (116.397, 39.916),
        )],
    )];

    let mut plans = vec![
        TravelPlan {
            id: "5f0c6a2e-3b1d-4c8e-9a7f-1d2e3f4a5b60".to_string(),
            title: "Weekend in Shanghai".to_string(),
            created_at: at(2025, 1, 10),
            updated_at: at(2025, 1, 10),
            preferences: TravelPreference {
                destination: "Shanghai".to_string(),
                start_date: date(2025, 5, 10),
                end_date: date(2025, 5, 12),
                budget: 2000.0,
                people_count: 2,
                preferences: vec!["food".to_string(), "shopping".to_string(), "culture".to_string()],
            },
            daily_itineraries: shanghai_days,
            total_budget: 2000.0,
            spent_budget: 0.0,
            status: PlanStatus::Draft,
            user_id: owner.clone(),
        },
        TravelPlan {
            id: "8a4b2c1d-7e6f-4a5b-8c9d-0e1f2a3b4c5d".to_string(),
            title: "Five days in Beijing".to_string(),
            created_at: at(2025, 1, 7),
            updated_at: at(2025, 1, 7),
            preferences: TravelPreference {
                destination: "Beijing".to_string(),
                start_date: date(2025, 6, 1),
                end_date: date(2025, 6, 5),
                budget: 5000.0,
                people_count: 1,
                preferences: vec!["history".to_string(), "food".to_string()],
            },
            daily_itineraries: beijing_days,
            total_budget: 5000.0,
            spent_budget: 0.0,
            status: PlanStatus::Draft,
            user_id: owner,
        },
    ];

    for plan in &mut plans {
        plan.spent_budget = plan.derived_spent_budget();
    }
    plans
}
