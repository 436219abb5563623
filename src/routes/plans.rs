use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::app::AppState;
use crate::error::PlannerError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::{PlanUpdate, TravelPlan, TravelPreference};
use crate::services::planner::RefreshOutcome;

#[derive(Serialize)]
struct PlanListResponse {
    status: &'static str,
    plans: Vec<TravelPlan>,
}

#[derive(Serialize)]
struct LastResponse {
    response: Option<serde_json::Value>,
}

/*
    POST /api/plans/generate
*/
pub async fn generate(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    input: web::Json<TravelPreference>,
) -> Result<HttpResponse, PlannerError> {
    let session = state.planner.session(&user.user_id).await;
    let plan = session.generate_plan(input.into_inner()).await?;
    Ok(HttpResponse::Created().json(plan))
}

/*
    GET /api/plans
    Refreshes through the fetch guard. A throttled or superseded refresh is
    not an error; it answers with the list the session already holds.
*/
pub async fn list(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, PlannerError> {
    let session = state.planner.session(&user.user_id).await;
    let outcome = session.refresh_plans().await?;
    let status = outcome.label();

    let plans = match outcome {
        RefreshOutcome::Refreshed(plans) | RefreshOutcome::Throttled(plans) => plans,
        RefreshOutcome::Discarded => session.snapshot().await.plans,
    };
    Ok(HttpResponse::Ok().json(PlanListResponse { status, plans }))
}

/*
    GET /api/plans/state
*/
pub async fn state(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    let session = state.planner.session(&user.user_id).await;
    HttpResponse::Ok().json(session.snapshot().await)
}

/*
    DELETE /api/plans/state/error
*/
pub async fn clear_error(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    let session = state.planner.session(&user.user_id).await;
    session.clear_error().await;
    HttpResponse::NoContent().finish()
}

/*
    GET /api/plans/debug/last-response
*/
pub async fn last_response(state: web::Data<AppState>, _user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(LastResponse {
        response: state.planner.last_api_response(),
    })
}

/*
    POST /api/plans/{id}/select
*/
pub async fn select(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, PlannerError> {
    let session = state.planner.session(&user.user_id).await;
    let plan = session.select_plan(Some(path.as_str())).await?;
    Ok(HttpResponse::Ok().json(plan))
}

/*
    DELETE /api/plans/current
*/
pub async fn deselect(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, PlannerError> {
    let session = state.planner.session(&user.user_id).await;
    session.select_plan(None).await?;
    Ok(HttpResponse::NoContent().finish())
}

/*
    PATCH /api/plans/{id}
*/
pub async fn update(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<PlanUpdate>,
) -> Result<HttpResponse, PlannerError> {
    let session = state.planner.session(&user.user_id).await;
    let plan = session.update_plan(&path, &input).await?;
    Ok(HttpResponse::Ok().json(plan))
}

/*
    DELETE /api/plans/{id}
    Best effort: unknown ids and store outages still answer 204.
*/
pub async fn delete(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> HttpResponse {
    let session = state.planner.session(&user.user_id).await;
    session.delete_plan(&path).await;
    HttpResponse::NoContent().finish()
}
