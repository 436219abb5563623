pub mod account_service;
pub mod expense_service;
pub mod fetch_guard;
pub mod generation_client;
pub mod local_cache;
pub mod normalizer;
pub mod persistence;
pub mod plan_store;
pub mod planner;
pub mod sample_plans;
pub mod state;
