use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::PlannerError;
use crate::services::account_service::{AccountService, AccountStore, MongoAccountStore};
use crate::services::expense_service::{ExpenseService, ExpenseStore, MongoExpenseStore};
use crate::services::generation_client::{ChatCompletionClient, ItineraryGenerator};
use crate::services::local_cache::{FileStorage, LocalPlanCache};
use crate::services::persistence::PersistenceCoordinator;
use crate::services::plan_store::{MongoPlanStore, RemotePlanStore};
use crate::services::planner::TravelPlanner;

/// Everything the HTTP handlers share, built once at startup.
pub struct AppState {
    pub planner: TravelPlanner,
    pub expenses: ExpenseService,
    pub accounts: AccountService,
    pub plan_store: Arc<dyn RemotePlanStore>,
    pub model: String,
}

/// Backends behind [`AppState`]; tests swap in in-memory ones.
pub struct Backends {
    pub generator: Arc<dyn ItineraryGenerator>,
    pub plan_store: Arc<dyn RemotePlanStore>,
    pub cache: Arc<LocalPlanCache>,
    pub expense_store: Arc<dyn ExpenseStore>,
    pub account_store: Arc<dyn AccountStore>,
}

impl AppState {
    pub fn new(config: &AppConfig, backends: Backends) -> Self {
        let coordinator = Arc::new(PersistenceCoordinator::new(
            backends.plan_store.clone(),
            backends.cache,
            config.fetch.timeout,
        ));

        Self {
            planner: TravelPlanner::new(backends.generator, coordinator, config.fetch),
            expenses: ExpenseService::new(backends.expense_store),
            accounts: AccountService::new(
                backends.account_store,
                config.jwt_secret.clone(),
                config.auto_confirm_email,
            )
            .with_hash_cost(config.bcrypt_cost),
            plan_store: backends.plan_store,
            model: config.llm.model.clone(),
        }
    }

    /// Production wiring: MongoDB, the chat-completion client and a file cache.
    pub async fn connect(config: &AppConfig) -> Result<Self, PlannerError> {
        let database = crate::db::mongo::connect(&config.mongodb_uri, &config.database).await?;

        let backends = Backends {
            generator: Arc::new(ChatCompletionClient::new(config.llm.clone())?),
            plan_store: Arc::new(MongoPlanStore::new(&database)),
            cache: Arc::new(LocalPlanCache::new(FileStorage::new(config.cache_dir.clone()))),
            expense_store: Arc::new(MongoExpenseStore::new(&database)),
            account_store: Arc::new(MongoAccountStore::new(&database)),
        };

        if config.llm.api_key.is_none() {
            log::warn!("LLM_API_KEY is not set; plan generation will fail until it is");
        }

        Ok(Self::new(config, backends))
    }
}
