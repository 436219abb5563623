use serde::Serialize;

use crate::error::PlannerError;
use crate::models::TravelPlan;

/// Per-session view of the planner, changed only through [`TravelEvent`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelState {
    pub plans: Vec<TravelPlan>,
    pub current_plan: Option<TravelPlan>,
    pub is_loading: bool,
    pub is_generating: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum TravelEvent {
    GenerationStarted,
    GenerationSucceeded(TravelPlan),
    GenerationFailed(String),
    ListFetchStarted,
    ListFetchSucceeded(Vec<TravelPlan>),
    ListFetchFailed(PlannerError),
    UpdateStarted,
    PlanUpdated(TravelPlan),
    UpdateFailed(String),
    DeleteStarted,
    PlanDeleted(String),
    CurrentPlanSelected(Option<TravelPlan>),
    ErrorCleared,
}

impl TravelState {
    pub fn apply(&mut self, event: TravelEvent) {
        match event {
            TravelEvent::GenerationStarted => {
                self.is_generating = true;
                self.error = None;
            }
            TravelEvent::GenerationSucceeded(plan) => {
                self.plans.retain(|existing| existing.id != plan.id);
                self.plans.insert(0, plan.clone());
                self.current_plan = Some(plan);
                self.is_generating = false;
            }
            TravelEvent::GenerationFailed(message) => {
                self.is_generating = false;
                self.error = Some(message);
            }
            // a prior error stays visible while a background refresh runs
            TravelEvent::ListFetchStarted => self.is_loading = true,
            TravelEvent::ListFetchSucceeded(plans) => {
                self.plans = plans;
                self.is_loading = false;
            }
            TravelEvent::ListFetchFailed(PlannerError::RateLimited) => {}
            TravelEvent::ListFetchFailed(err) => {
                self.is_loading = false;
                self.error = Some(err.user_message());
            }
            TravelEvent::UpdateStarted | TravelEvent::DeleteStarted => {
                self.is_loading = true;
                self.error = None;
            }
            TravelEvent::PlanUpdated(plan) => {
                if let Some(existing) = self.plans.iter_mut().find(|p| p.id == plan.id) {
                    *existing = plan.clone();
                }
                if self.current_plan.as_ref().is_some_and(|p| p.id == plan.id) {
                    self.current_plan = Some(plan);
                }
                self.is_loading = false;
            }
            TravelEvent::UpdateFailed(message) => {
                self.is_loading = false;
                self.error = Some(message);
            }
            TravelEvent::PlanDeleted(id) => {
                self.plans.retain(|plan| plan.id != id);
                if self.current_plan.as_ref().is_some_and(|p| p.id == id) {
                    self.current_plan = None;
                }
                self.is_loading = false;
            }
            TravelEvent::CurrentPlanSelected(plan) => self.current_plan = plan,
            TravelEvent::ErrorCleared => self.error = None,
        }
    }
}
