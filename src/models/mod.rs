pub mod expense;
pub mod plan;
pub mod preference;
pub mod user;

pub use plan::{Activity, ActivityType, DailyItinerary, PlanStatus, PlanUpdate, TravelPlan};
pub use preference::TravelPreference;
