#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use actix_web::{web, App};
use async_trait::async_trait;

use travel_planner::app::{AppState, Backends};
use travel_planner::config::{AppConfig, FetchGuardConfig, LlmConfig, LLM_BASE_URL};
use travel_planner::error::PlannerError;
use travel_planner::middleware::auth::generate_token;
use travel_planner::models::TravelPreference;
use travel_planner::routes;
use travel_planner::services::account_service::InMemoryAccountStore;
use travel_planner::services::expense_service::InMemoryExpenseStore;
use travel_planner::services::generation_client::ItineraryGenerator;
use travel_planner::services::local_cache::LocalPlanCache;
use travel_planner::services::plan_store::InMemoryPlanStore;

pub const TEST_SECRET: &str = "test_secret";

pub const KYOTO_RESPONSE: &str = r#"{"title":"Kyoto trip","dailyItineraries":[{"date":"2025-04-01","activities":[{"type":"attraction","name":"Fushimi Inari","cost":0,"duration":120,"description":"shrine walk"}],"totalCost":0}],"spentBudget":0}"#;

/// Generator that answers every request with a fixed completion.
pub struct StubGenerator {
    content: String,
    last: Mutex<Option<serde_json::Value>>,
}

impl StubGenerator {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ItineraryGenerator for StubGenerator {
    async fn generate(&self, _: &TravelPreference) -> Result<String, PlannerError> {
        let envelope = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": self.content } }]
        });
        *self.last.lock().unwrap() = Some(envelope);
        Ok(self.content.clone())
    }

    fn last_response(&self) -> Option<serde_json::Value> {
        self.last.lock().unwrap().clone()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        mongodb_uri: "mongodb://localhost:27017".to_string(),
        database: "TravelPlannerTest".to_string(),
        llm: LlmConfig::new(LLM_BASE_URL).expect("llm config"),
        cache_dir: PathBuf::from(".cache-test"),
        fetch: FetchGuardConfig::default(),
        jwt_secret: TEST_SECRET.to_string(),
        auto_confirm_email: true,
        bcrypt_cost: 4,
    }
}

pub struct TestApp {
    pub state: web::Data<AppState>,
    pub plan_store: Arc<InMemoryPlanStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_response(KYOTO_RESPONSE)
    }

    pub fn with_response(content: &str) -> Self {
        let plan_store = Arc::new(InMemoryPlanStore::new());
        let backends = Backends {
            generator: Arc::new(StubGenerator::new(content)),
            plan_store: plan_store.clone(),
            cache: Arc::new(LocalPlanCache::in_memory()),
            expense_store: Arc::new(InMemoryExpenseStore::default()),
            account_store: Arc::new(InMemoryAccountStore::default()),
        };

        Self {
            state: web::Data::new(AppState::new(&test_config(), backends)),
            plan_store,
        }
    }

    pub fn create_app(
        &self,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.state.clone())
            .configure(|cfg| routes::configure(cfg, TEST_SECRET))
    }
}

pub fn bearer(user_id: &str) -> (&'static str, String) {
    let token = generate_token(TEST_SECRET, &format!("{}@example.com", user_id), user_id)
        .expect("token");
    ("Authorization", format!("Bearer {}", token))
}

pub fn kyoto_preference() -> serde_json::Value {
    serde_json::json!({
        "destination": "Kyoto",
        "startDate": "2025-04-01",
        "endDate": "2025-04-03",
        "budget": 3000,
        "peopleCount": 2,
        "preferences": ["food", "culture"]
    })
}
