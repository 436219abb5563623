use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::app::AppState;
use crate::error::PlannerError;
use crate::middleware::auth_context::MaybeUser;
use crate::models::user::{ConfirmRequest, LoginRequest, RegisterRequest, User};

#[derive(Serialize)]
struct SessionResponse {
    user: Option<User>,
}

pub async fn register(
    state: web::Data<AppState>,
    input: web::Json<RegisterRequest>,
) -> Result<HttpResponse, PlannerError> {
    let outcome = state.accounts.register(input.into_inner()).await?;
    Ok(HttpResponse::Created().json(outcome))
}

pub async fn login(
    state: web::Data<AppState>,
    input: web::Json<LoginRequest>,
) -> Result<HttpResponse, PlannerError> {
    let outcome = state.accounts.login(input.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn confirm(
    state: web::Data<AppState>,
    input: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, PlannerError> {
    let outcome = state.accounts.confirm(input.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Always succeeds, signed in or not. Drops the caller's planner session.
pub async fn logout(state: web::Data<AppState>, user: MaybeUser) -> HttpResponse {
    if let MaybeUser(Some(user)) = user {
        state.planner.end_session(&user.user_id).await;
        log::info!("Signed out {}", user.user_id);
    }
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

/// Current account, or `null` when the request is not signed in.
pub async fn session(state: web::Data<AppState>, user: MaybeUser) -> HttpResponse {
    let user_id = user.0.as_ref().map(|user| user.user_id.as_str());
    let user = state.accounts.current_user(user_id).await.unwrap_or_else(|err| {
        log::warn!("Session lookup failed: {}", err);
        None
    });
    HttpResponse::Ok().json(SessionResponse { user })
}
