//! Orchestrates generation, persistence and the per-user state projection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::Abortable;
use tokio::sync::Mutex;

use crate::config::FetchGuardConfig;
use crate::error::PlannerError;
use crate::models::{PlanUpdate, TravelPlan, TravelPreference};
use crate::services::fetch_guard::{FetchGuard, RefreshDecision};
use crate::services::generation_client::ItineraryGenerator;
use crate::services::normalizer::normalize;
use crate::services::persistence::PersistenceCoordinator;
use crate::services::state::{TravelEvent, TravelState};

/// Result of a list refresh that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed(Vec<TravelPlan>),
    /// Rejected by the throttle; carries the list already in state.
    Throttled(Vec<TravelPlan>),
    /// A newer refresh took over before this one finished.
    Discarded,
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed(_) => "refreshed",
            RefreshOutcome::Throttled(_) => "throttled",
            RefreshOutcome::Discarded => "superseded",
        }
    }
}

/// Sessions unused for this long are dropped on the next lookup.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared services plus one session per signed-in user.
pub struct TravelPlanner {
    generator: Arc<dyn ItineraryGenerator>,
    coordinator: Arc<PersistenceCoordinator>,
    fetch: FetchGuardConfig,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, Arc<PlannerSession>>>,
}

impl TravelPlanner {
    pub fn new(
        generator: Arc<dyn ItineraryGenerator>,
        coordinator: Arc<PersistenceCoordinator>,
        fetch: FetchGuardConfig,
    ) -> Self {
        Self {
            generator,
            coordinator,
            fetch,
            idle_ttl: SESSION_IDLE_TTL,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn coordinator(&self) -> &Arc<PersistenceCoordinator> {
        &self.coordinator
    }

    /// The session of `user_id`, created on first use. Other sessions idle
    /// for longer than the idle TTL are closed on the way.
    pub async fn session(&self, user_id: &str) -> Arc<PlannerSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|owner, session| {
            let keep = owner == user_id || session.idle_for(now) < self.idle_ttl;
            if !keep {
                session.guard.reset();
                log::debug!("Evicted idle planner session for {}", owner);
            }
            keep
        });

        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                log::debug!("Opening planner session for {}", user_id);
                Arc::new(PlannerSession::new(
                    user_id.to_string(),
                    self.generator.clone(),
                    self.coordinator.clone(),
                    self.fetch,
                ))
            })
            .clone();
        session.touch(now);
        session
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drops the session of `user_id`, aborting its refresh if one runs.
    pub async fn end_session(&self, user_id: &str) {
        if let Some(session) = self.sessions.lock().await.remove(user_id) {
            session.guard.reset();
            log::debug!("Closed planner session for {}", user_id);
        }
    }

    pub fn last_api_response(&self) -> Option<serde_json::Value> {
        self.generator.last_response()
    }
}

pub struct PlannerSession {
    user_id: String,
    generator: Arc<dyn ItineraryGenerator>,
    coordinator: Arc<PersistenceCoordinator>,
    guard: FetchGuard,
    state: Mutex<TravelState>,
    last_used: std::sync::Mutex<Instant>,
}

impl PlannerSession {
    pub fn new(
        user_id: String,
        generator: Arc<dyn ItineraryGenerator>,
        coordinator: Arc<PersistenceCoordinator>,
        fetch: FetchGuardConfig,
    ) -> Self {
        Self {
            user_id,
            generator,
            coordinator,
            guard: FetchGuard::new(fetch),
            state: Mutex::new(TravelState::default()),
            last_used: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn touch(&self, now: Instant) {
        *self
            .last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_used = *self
            .last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        now.saturating_duration_since(last_used)
    }

    async fn apply(&self, event: TravelEvent) {
        self.state.lock().await.apply(event);
    }

    pub async fn snapshot(&self) -> TravelState {
        self.state.lock().await.clone()
    }

    /// Preference in, stored plan out. The result is applied to state even
    /// when it arrives after other activity in the session.
    pub async fn generate_plan(
        &self,
        preference: TravelPreference,
    ) -> Result<TravelPlan, PlannerError> {
        let preference = preference.normalized();
        preference.validate()?;

        self.apply(TravelEvent::GenerationStarted).await;
        log::info!(
            "Generating plan for {} ({} days) for user {}",
            preference.destination,
            preference.trip_days(),
            self.user_id
        );

        match self.run_generation(&preference).await {
            Ok(plan) => {
                log::info!(
                    "Generated plan {} with {} activities",
                    plan.id,
                    plan.activity_count()
                );
                self.apply(TravelEvent::GenerationSucceeded(plan.clone())).await;
                Ok(plan)
            }
            Err(err) => {
                log::warn!("Plan generation for {} failed: {}", self.user_id, err);
                self.apply(TravelEvent::GenerationFailed(err.user_message()))
                    .await;
                Err(err)
            }
        }
    }

    async fn run_generation(
        &self,
        preference: &TravelPreference,
    ) -> Result<TravelPlan, PlannerError> {
        let raw = self.generator.generate(preference).await?;
        let mut plan = normalize(&raw, preference)?;
        plan.user_id = Some(self.user_id.clone());
        self.coordinator.create(plan).await
    }

    /// Reloads the plan list through the fetch guard. A slow or failing
    /// remote store degrades to the cache inside the coordinator, so the
    /// only non-refreshed outcomes are a throttle and a superseded run.
    pub async fn refresh_plans(&self) -> Result<RefreshOutcome, PlannerError> {
        let admission = match self.guard.request_list_refresh(&self.user_id) {
            RefreshDecision::TooFrequent => {
                self.apply(TravelEvent::ListFetchFailed(PlannerError::RateLimited))
                    .await;
                return Ok(RefreshOutcome::Throttled(self.snapshot().await.plans));
            }
            RefreshDecision::Superseded(admission) => {
                log::debug!("Refresh for {} superseded an in-flight refresh", self.user_id);
                admission
            }
            RefreshDecision::Admitted(admission) => admission,
        };

        self.apply(TravelEvent::ListFetchStarted).await;

        let listing = Abortable::new(
            self.coordinator.list(Some(self.user_id.as_str())),
            admission.registration,
        );

        match listing.await {
            Ok(plans) if self.guard.finish(&admission.ticket) => {
                self.apply(TravelEvent::ListFetchSucceeded(plans.clone()))
                    .await;
                Ok(RefreshOutcome::Refreshed(plans))
            }
            Ok(_) | Err(_) => {
                log::debug!("Dropping superseded plan refresh for {}", self.user_id);
                Ok(RefreshOutcome::Discarded)
            }
        }
    }

    pub async fn update_plan(
        &self,
        id: &str,
        update: &PlanUpdate,
    ) -> Result<TravelPlan, PlannerError> {
        self.apply(TravelEvent::UpdateStarted).await;
        log::info!("Updating {:?} of plan {}", update.field_names(), id);

        match self.coordinator.update(id, update).await {
            Ok(plan) => {
                self.apply(TravelEvent::PlanUpdated(plan.clone())).await;
                Ok(plan)
            }
            Err(err) => {
                self.apply(TravelEvent::UpdateFailed(err.user_message()))
                    .await;
                Err(err)
            }
        }
    }

    /// Best-effort delete; unknown ids succeed too.
    pub async fn delete_plan(&self, id: &str) {
        self.apply(TravelEvent::DeleteStarted).await;
        self.coordinator.delete(id).await;
        self.apply(TravelEvent::PlanDeleted(id.to_string())).await;
    }

    /// Selects a plan from the session's list, or clears the selection.
    pub async fn select_plan(&self, id: Option<&str>) -> Result<Option<TravelPlan>, PlannerError> {
        let mut state = self.state.lock().await;
        let selected = match id {
            Some(id) => Some(
                state
                    .plans
                    .iter()
                    .find(|plan| plan.id == id)
                    .cloned()
                    .ok_or_else(|| PlannerError::NotFound(format!("plan {}", id)))?,
            ),
            None => None,
        };
        state.apply(TravelEvent::CurrentPlanSelected(selected.clone()));
        Ok(selected)
    }

    pub async fn clear_error(&self) {
        self.apply(TravelEvent::ErrorCleared).await;
    }
}
